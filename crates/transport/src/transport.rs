use async_trait::async_trait;
use thiserror::Error;

use vendedor_core::domain::customer::CustomerId;
use vendedor_db::SessionCredentials;

use crate::events::{ChatEvent, InboundMessage, MessageRef, OutboundContent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("media download failed: {0}")]
    Media(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// Opens sessions against the chat network.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn connect(
        &self,
        credentials: SessionCredentials,
    ) -> Result<Box<dyn ChatSession>, TransportError>;
}

/// One live connection. `next_event` returning `Ok(None)` means the stream ended.
#[async_trait]
pub trait ChatSession: Send + Sync {
    async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError>;

    /// Current credential blob, including anything negotiated during the handshake.
    fn credentials(&self) -> SessionCredentials;

    async fn send(
        &self,
        to: &CustomerId,
        content: &OutboundContent,
        quoted: Option<&MessageRef>,
    ) -> Result<MessageRef, TransportError>;

    async fn download_media(&self, message: &MessageRef) -> Result<Vec<u8>, TransportError>;

    /// Unlinks the device. The server answers with a `LoggedOut` close.
    async fn logout(&self) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// Receives every inbound message that was not sent by this device.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle_message(&self, message: InboundMessage);
}

/// Outbound half of the transport, as seen by the message pipeline.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send_message(
        &self,
        to: &CustomerId,
        content: OutboundContent,
        quoted: Option<&MessageRef>,
    ) -> Result<MessageRef, crate::supervisor::SupervisorError>;
}

/// Accepts a connection and then stays idle until closed.
#[derive(Default)]
pub struct NoopChatTransport;

#[async_trait]
impl ChatTransport for NoopChatTransport {
    async fn connect(
        &self,
        credentials: SessionCredentials,
    ) -> Result<Box<dyn ChatSession>, TransportError> {
        Ok(Box::new(NoopChatSession { credentials, opened: tokio::sync::Mutex::new(false) }))
    }
}

struct NoopChatSession {
    credentials: SessionCredentials,
    opened: tokio::sync::Mutex<bool>,
}

#[async_trait]
impl ChatSession for NoopChatSession {
    async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError> {
        let mut opened = self.opened.lock().await;
        if !*opened {
            *opened = true;
            return Ok(Some(ChatEvent::ConnectionUpdate(crate::events::ConnectionUpdate::open())));
        }
        drop(opened);
        std::future::pending::<()>().await;
        Ok(None)
    }

    fn credentials(&self) -> SessionCredentials {
        self.credentials.clone()
    }

    async fn send(
        &self,
        _to: &CustomerId,
        _content: &OutboundContent,
        _quoted: Option<&MessageRef>,
    ) -> Result<MessageRef, TransportError> {
        Ok(MessageRef("noop".to_owned()))
    }

    async fn download_media(&self, _message: &MessageRef) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Media("noop transport carries no media".to_owned()))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
