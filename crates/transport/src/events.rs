use serde::{Deserialize, Serialize};

use vendedor_core::domain::customer::CustomerId;
use vendedor_db::SessionCredentials;

/// Transport-assigned message identifier, used for quoting and media download.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Why a session closed. Only `LoggedOut` invalidates the stored session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    LoggedOut,
    ConnectionLost(String),
    ConnectFailed(String),
    TimedOut,
    RestartRequired,
}

impl CloseReason {
    /// Maps the numeric disconnect codes used by multi-device chat servers.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            408 => Self::TimedOut,
            515 => Self::RestartRequired,
            other => Self::ConnectionLost(format!("status {other}")),
        }
    }

    pub fn is_session_invalidated(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionUpdate {
    pub state: ConnectionState,
    pub close_reason: Option<CloseReason>,
    /// Present while the session waits to be paired with a phone.
    pub pairing_code: Option<String>,
}

impl ConnectionUpdate {
    pub fn open() -> Self {
        Self { state: ConnectionState::Open, close_reason: None, pairing_code: None }
    }

    pub fn closed(reason: CloseReason) -> Self {
        Self { state: ConnectionState::Closed, close_reason: Some(reason), pairing_code: None }
    }
}

/// The subset of an inbound chat message the engine reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePayload {
    pub text: Option<String>,
    /// Text of a reply or link-preview message.
    pub extended_text: Option<String>,
    pub image_caption: Option<String>,
    pub document_title: Option<String>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }

    /// First non-blank of plain text, extended text, image caption, document title.
    pub fn extract_text(&self) -> Option<&str> {
        [&self.text, &self.extended_text, &self.image_caption, &self.document_title]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref())
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: MessageRef,
    pub sender: CustomerId,
    pub payload: MessagePayload,
    pub from_me: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    ConnectionUpdate(ConnectionUpdate),
    MessageReceived(InboundMessage),
    /// The transport rotated its session keys; the new blob must be persisted.
    CredentialsUpdated(SessionCredentials),
    PresenceUpdate { sender: CustomerId, presence: String },
    GroupUpdate { group_id: String, subject: Option<String> },
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionUpdate(_) => "connection_update",
            Self::MessageReceived(_) => "message_received",
            Self::CredentialsUpdated(_) => "credentials_updated",
            Self::PresenceUpdate { .. } => "presence_update",
            Self::GroupUpdate { .. } => "group_update",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    Media { bytes: Vec<u8>, caption: Option<String> },
}

impl OutboundContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Media { .. } => "media",
        }
    }
}
