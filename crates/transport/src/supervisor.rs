use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use vendedor_core::config::TransportConfig;
use vendedor_core::domain::customer::CustomerId;
use vendedor_db::{CredentialStore, RepositoryError, SessionCredentials};

use crate::events::{ChatEvent, CloseReason, ConnectionState, MessageRef, OutboundContent};
use crate::transport::{ChatSession, ChatTransport, InboundHandler, OutboundSender, TransportError};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("chat session is not connected")]
    NotConnected,
    #[error("chat session was logged out; the device must be paired again")]
    SessionInvalidated,
    #[error("gave up reconnecting after {attempts} attempts (last close: {last_reason:?})")]
    ReconnectExhausted { attempts: u32, last_reason: CloseReason },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Credentials(#[from] RepositoryError),
}

impl SupervisorError {
    /// Fatal errors end the supervisor; everything else is per-call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionInvalidated | Self::ReconnectExhausted { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, backoff: Duration::from_secs(5) }
    }
}

impl From<&TransportConfig> for ReconnectPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self { max_attempts: config.reconnect_max_attempts, backoff: config.reconnect_backoff() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed(CloseReason),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    pub reconnect_attempts: u32,
    pub connected: bool,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self { state: SupervisorState::Disconnected, reconnect_attempts: 0, connected: false }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    LoggedOut,
    Exhausted { attempts: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseDecision {
    Reconnect { attempt: u32, delay: Duration },
    Stop(StopReason),
}

/// Decides what follows a closed session. A logout stops regardless of `attempts`.
pub fn on_close(reason: &CloseReason, attempts: u32, policy: &ReconnectPolicy) -> CloseDecision {
    if reason.is_session_invalidated() {
        return CloseDecision::Stop(StopReason::LoggedOut);
    }
    if attempts < policy.max_attempts {
        CloseDecision::Reconnect { attempt: attempts + 1, delay: policy.backoff }
    } else {
        CloseDecision::Stop(StopReason::Exhausted { attempts })
    }
}

enum SessionEnd {
    Cancelled,
    Closed(CloseReason),
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn ChatTransport>,
    credentials: CredentialStore,
    policy: ReconnectPolicy,
    session: RwLock<Option<Arc<dyn ChatSession>>>,
    status: Mutex<SupervisorStatus>,
    logout_requested: AtomicBool,
    tasks: TaskTracker,
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        credentials: CredentialStore,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            session: RwLock::new(None),
            status: Mutex::new(SupervisorStatus::default()),
            logout_requested: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        }
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update_status(&self, apply: impl FnOnce(&mut SupervisorStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status);
        status.connected = status.state == SupervisorState::Open;
    }

    fn set_state(&self, state: SupervisorState) {
        self.update_status(|status| status.state = state);
    }

    /// Runs sessions until cancelled, logged out, or out of reconnect attempts.
    /// In-flight message handlers are awaited before returning.
    pub async fn run(
        &self,
        handler: Arc<dyn InboundHandler>,
        cancel: CancellationToken,
    ) -> Result<(), SupervisorError> {
        let outcome = self.supervise(&handler, &cancel).await;
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
        outcome
    }

    async fn supervise(
        &self,
        handler: &Arc<dyn InboundHandler>,
        cancel: &CancellationToken,
    ) -> Result<(), SupervisorError> {
        loop {
            if cancel.is_cancelled() {
                self.set_state(SupervisorState::Disconnected);
                return Ok(());
            }

            let reason = match self.connect_and_pump(handler, cancel).await {
                Ok(SessionEnd::Cancelled) => {
                    self.set_state(SupervisorState::Disconnected);
                    return Ok(());
                }
                Ok(SessionEnd::Closed(reason)) => reason,
                Err(error) => CloseReason::ConnectFailed(error.to_string()),
            };
            *self.session.write().await = None;
            self.set_state(SupervisorState::Closed(reason.clone()));

            let attempts = self.status().reconnect_attempts;
            match on_close(&reason, attempts, &self.policy) {
                CloseDecision::Reconnect { attempt, delay } => {
                    self.update_status(|status| status.reconnect_attempts = attempt);
                    warn!(
                        event_name = "transport.connection.reconnect_scheduled",
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = ?reason,
                        "chat connection closed, reconnecting after backoff"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(
                                event_name = "transport.connection.reconnect_abandoned",
                                attempt,
                                "shutdown requested during reconnect backoff"
                            );
                            self.set_state(SupervisorState::Disconnected);
                            return Ok(());
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                CloseDecision::Stop(StopReason::LoggedOut) => {
                    if self.logout_requested.swap(false, Ordering::SeqCst) {
                        info!(
                            event_name = "transport.connection.logged_out",
                            "chat session logged out on request"
                        );
                        return Ok(());
                    }
                    error!(
                        event_name = "transport.connection.logged_out",
                        "chat session was logged out remotely, not reconnecting"
                    );
                    if let Err(error) = self.credentials.clear().await {
                        warn!(
                            event_name = "transport.credentials.clear_failed",
                            error = %error,
                            "failed to clear invalidated credentials"
                        );
                    }
                    return Err(SupervisorError::SessionInvalidated);
                }
                CloseDecision::Stop(StopReason::Exhausted { attempts }) => {
                    error!(
                        event_name = "transport.connection.reconnect_exhausted",
                        attempts,
                        reason = ?reason,
                        "maximum reconnect attempts reached"
                    );
                    return Err(SupervisorError::ReconnectExhausted {
                        attempts,
                        last_reason: reason,
                    });
                }
            }
        }
    }

    async fn load_credentials(&self) -> SessionCredentials {
        match self.credentials.load_or_create().await {
            Ok(credentials) => credentials,
            Err(error) => {
                warn!(
                    event_name = "transport.credentials.load_failed",
                    error = %error,
                    "stored credentials unreadable, starting an unpaired session"
                );
                SessionCredentials::empty()
            }
        }
    }

    async fn persist_credentials(&self, credentials: &SessionCredentials) {
        if let Err(error) = self.credentials.save(credentials).await {
            warn!(
                event_name = "transport.credentials.save_failed",
                error = %error,
                "failed to persist chat credentials"
            );
        }
    }

    async fn connect_and_pump(
        &self,
        handler: &Arc<dyn InboundHandler>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, TransportError> {
        self.set_state(SupervisorState::Connecting);
        let credentials = self.load_credentials().await;
        info!(
            event_name = "transport.connection.connecting",
            attempt = self.status().reconnect_attempts,
            paired = !credentials.is_empty(),
            "opening chat transport session"
        );

        let session: Arc<dyn ChatSession> = Arc::from(self.transport.connect(credentials).await?);
        *self.session.write().await = Some(Arc::clone(&session));

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(SupervisorState::Closing);
                    if let Err(error) = session.close().await {
                        warn!(
                            event_name = "transport.connection.close_failed",
                            error = %error,
                            "failed to close chat session during shutdown"
                        );
                    }
                    *self.session.write().await = None;
                    return Ok(SessionEnd::Cancelled);
                }
                event = session.next_event() => event,
            };

            let event = match event {
                Ok(Some(event)) => event,
                Ok(None) => {
                    return Ok(SessionEnd::Closed(CloseReason::ConnectionLost(
                        "event stream ended".to_owned(),
                    )))
                }
                Err(error) => {
                    return Ok(SessionEnd::Closed(CloseReason::ConnectionLost(error.to_string())))
                }
            };

            match event {
                ChatEvent::ConnectionUpdate(update) => {
                    if let Some(code) = &update.pairing_code {
                        info!(
                            event_name = "transport.connection.pairing_code",
                            pairing_code = %code,
                            "pairing code issued, link the device to continue"
                        );
                    }
                    match update.state {
                        ConnectionState::Connecting => self.set_state(SupervisorState::Connecting),
                        ConnectionState::Open => {
                            self.update_status(|status| {
                                status.state = SupervisorState::Open;
                                status.reconnect_attempts = 0;
                            });
                            info!(
                                event_name = "transport.connection.open",
                                "chat transport connected"
                            );
                            self.persist_credentials(&session.credentials()).await;
                        }
                        ConnectionState::Closed => {
                            let reason = update.close_reason.unwrap_or_else(|| {
                                CloseReason::ConnectionLost("closed without reason".to_owned())
                            });
                            return Ok(SessionEnd::Closed(reason));
                        }
                    }
                }
                ChatEvent::MessageReceived(message) => {
                    if message.from_me {
                        continue;
                    }
                    debug!(
                        event_name = "ingress.chat.message_received",
                        correlation_id = %message.id.0,
                        customer_id = %message.sender,
                        "dispatching inbound message"
                    );
                    let handler = Arc::clone(handler);
                    self.tasks.spawn(async move { handler.handle_message(message).await });
                }
                ChatEvent::CredentialsUpdated(credentials) => {
                    self.persist_credentials(&credentials).await;
                }
                ChatEvent::PresenceUpdate { sender, presence } => {
                    debug!(
                        event_name = "transport.presence.updated",
                        customer_id = %sender,
                        presence = %presence,
                        "presence updated"
                    );
                }
                ChatEvent::GroupUpdate { group_id, subject } => {
                    info!(
                        event_name = "transport.group.updated",
                        group_id = %group_id,
                        subject = subject.as_deref().unwrap_or("unknown"),
                        "group updated"
                    );
                }
            }
        }
    }

    async fn open_session(&self) -> Result<Arc<dyn ChatSession>, SupervisorError> {
        if !self.status().connected {
            return Err(SupervisorError::NotConnected);
        }
        self.session.read().await.clone().ok_or(SupervisorError::NotConnected)
    }

    /// Best effort: failures are logged and reported as `None`.
    pub async fn download_media(&self, message: &MessageRef) -> Option<Vec<u8>> {
        let session = self.open_session().await.ok()?;
        match session.download_media(message).await {
            Ok(bytes) => Some(bytes),
            Err(error) => {
                warn!(
                    event_name = "transport.media.download_failed",
                    correlation_id = %message.0,
                    error = %error,
                    "failed to download media"
                );
                None
            }
        }
    }

    /// Unlinks the device and forgets its credentials. `run` returns `Ok` once
    /// the resulting logout close arrives.
    pub async fn disconnect(&self) -> Result<(), SupervisorError> {
        let session = self.open_session().await?;
        self.logout_requested.store(true, Ordering::SeqCst);
        self.set_state(SupervisorState::Closing);
        if let Err(error) = session.logout().await {
            self.logout_requested.store(false, Ordering::SeqCst);
            return Err(error.into());
        }
        self.credentials.clear().await?;
        info!(event_name = "transport.connection.disconnected", "chat transport logged out");
        Ok(())
    }
}

#[async_trait]
impl OutboundSender for ConnectionSupervisor {
    async fn send_message(
        &self,
        to: &CustomerId,
        content: OutboundContent,
        quoted: Option<&MessageRef>,
    ) -> Result<MessageRef, SupervisorError> {
        let session = self.open_session().await?;
        match session.send(to, &content, quoted).await {
            Ok(message_ref) => {
                info!(
                    event_name = "egress.chat.message_sent",
                    correlation_id = %message_ref.0,
                    customer_id = %to,
                    kind = content.kind(),
                    "message sent"
                );
                Ok(message_ref)
            }
            Err(error) => {
                warn!(
                    event_name = "egress.chat.send_failed",
                    customer_id = %to,
                    kind = content.kind(),
                    error = %error,
                    "failed to send message"
                );
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::{Mutex, Notify};
    use tokio_util::sync::CancellationToken;

    use vendedor_core::domain::customer::CustomerId;
    use vendedor_db::{CredentialStore, InMemoryDocumentStore, SessionCredentials};

    use super::{
        on_close, CloseDecision, ConnectionSupervisor, ReconnectPolicy, StopReason,
        SupervisorError, SupervisorState,
    };
    use crate::events::{
        ChatEvent, CloseReason, ConnectionUpdate, InboundMessage, MessagePayload, MessageRef,
        OutboundContent,
    };
    use crate::transport::{
        ChatSession, ChatTransport, InboundHandler, OutboundSender, TransportError,
    };

    type Script = VecDeque<Result<Option<ChatEvent>, TransportError>>;

    /// Each connect pops the next session script; a script that runs dry parks forever.
    #[derive(Default)]
    struct ScriptedTransport {
        state: Arc<Mutex<ScriptedState>>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<Script, TransportError>>,
        connect_attempts: usize,
        sent: Vec<(CustomerId, OutboundContent)>,
        logouts: usize,
    }

    impl ScriptedTransport {
        fn with_sessions(sessions: Vec<Result<Vec<ChatEvent>, TransportError>>) -> Self {
            let connect_results = sessions
                .into_iter()
                .map(|session| {
                    session.map(|events| events.into_iter().map(|event| Ok(Some(event))).collect())
                })
                .collect();
            Self {
                state: Arc::new(Mutex::new(ScriptedState {
                    connect_results,
                    ..Default::default()
                })),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn connect(
            &self,
            _credentials: SessionCredentials,
        ) -> Result<Box<dyn ChatSession>, TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            let script = state.connect_results.pop_front().unwrap_or_else(|| Ok(Script::new()))?;
            Ok(Box::new(ScriptedSession {
                events: Mutex::new(script),
                shared: Arc::clone(&self.state),
                logged_out: Notify::new(),
            }))
        }
    }

    struct ScriptedSession {
        events: Mutex<Script>,
        shared: Arc<Mutex<ScriptedState>>,
        logged_out: Notify,
    }

    #[async_trait]
    impl ChatSession for ScriptedSession {
        async fn next_event(&self) -> Result<Option<ChatEvent>, TransportError> {
            if let Some(next) = self.events.lock().await.pop_front() {
                return next;
            }
            self.logged_out.notified().await;
            Ok(Some(ChatEvent::ConnectionUpdate(ConnectionUpdate::closed(CloseReason::LoggedOut))))
        }

        fn credentials(&self) -> SessionCredentials {
            SessionCredentials(json!({ "paired": true }))
        }

        async fn send(
            &self,
            to: &CustomerId,
            content: &OutboundContent,
            _quoted: Option<&MessageRef>,
        ) -> Result<MessageRef, TransportError> {
            self.shared.lock().await.sent.push((to.clone(), content.clone()));
            Ok(MessageRef("out-1".to_owned()))
        }

        async fn download_media(&self, _message: &MessageRef) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Media("expired".to_owned()))
        }

        async fn logout(&self) -> Result<(), TransportError> {
            self.shared.lock().await.logouts += 1;
            self.logged_out.notify_one();
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        received: Mutex<Vec<InboundMessage>>,
    }

    #[async_trait]
    impl InboundHandler for RecordingHandler {
        async fn handle_message(&self, message: InboundMessage) {
            self.received.lock().await.push(message);
        }
    }

    fn open() -> ChatEvent {
        ChatEvent::ConnectionUpdate(ConnectionUpdate::open())
    }

    fn closed(reason: CloseReason) -> ChatEvent {
        ChatEvent::ConnectionUpdate(ConnectionUpdate::closed(reason))
    }

    fn dropped() -> ChatEvent {
        closed(CloseReason::ConnectionLost("network reset".to_owned()))
    }

    fn inbound(id: &str, sender: &str, text: &str, from_me: bool) -> ChatEvent {
        ChatEvent::MessageReceived(InboundMessage {
            id: MessageRef(id.to_owned()),
            sender: CustomerId::new(sender),
            payload: MessagePayload::text(text),
            from_me,
        })
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_attempts, backoff: Duration::ZERO }
    }

    fn supervisor(
        transport: Arc<ScriptedTransport>,
        policy: ReconnectPolicy,
    ) -> (ConnectionSupervisor, CredentialStore) {
        let store = Arc::new(InMemoryDocumentStore::default());
        let supervisor = ConnectionSupervisor::new(
            transport,
            CredentialStore::new(store.clone()),
            policy,
        );
        (supervisor, CredentialStore::new(store))
    }

    #[test]
    fn logout_never_reconnects_whatever_the_attempt_count() {
        let policy = ReconnectPolicy::default();
        for attempts in [0, 1, 4, 5, 99] {
            assert_eq!(
                on_close(&CloseReason::LoggedOut, attempts, &policy),
                CloseDecision::Stop(StopReason::LoggedOut)
            );
        }
    }

    #[test]
    fn transient_close_retries_until_the_limit() {
        let policy = ReconnectPolicy::default();
        let reason = CloseReason::TimedOut;
        assert_eq!(
            on_close(&reason, 0, &policy),
            CloseDecision::Reconnect { attempt: 1, delay: Duration::from_secs(5) }
        );
        assert_eq!(
            on_close(&reason, 4, &policy),
            CloseDecision::Reconnect { attempt: 5, delay: Duration::from_secs(5) }
        );
        assert_eq!(
            on_close(&reason, 5, &policy),
            CloseDecision::Stop(StopReason::Exhausted { attempts: 5 })
        );
    }

    #[tokio::test]
    async fn remote_logout_stops_without_retry_and_clears_credentials() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![Ok(vec![
            open(),
            closed(CloseReason::LoggedOut),
        ])]));
        let (supervisor, credentials) = supervisor(transport.clone(), fast_policy(5));

        let outcome = supervisor
            .run(Arc::new(RecordingHandler::default()), CancellationToken::new())
            .await;

        assert!(matches!(outcome, Err(SupervisorError::SessionInvalidated)));
        assert_eq!(transport.connect_attempts().await, 1);
        assert_eq!(credentials.load().await.expect("load"), None);
        assert_eq!(supervisor.status().state, SupervisorState::Closed(CloseReason::LoggedOut));
    }

    #[tokio::test]
    async fn bounded_retries_then_fatal_error() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![
            Ok(vec![dropped()]),
            Err(TransportError::Connect("dns".to_owned())),
            Ok(vec![dropped()]),
            Ok(vec![dropped()]),
        ]));
        let (supervisor, _) = supervisor(transport.clone(), fast_policy(3));

        let outcome = supervisor
            .run(Arc::new(RecordingHandler::default()), CancellationToken::new())
            .await;

        match outcome {
            Err(SupervisorError::ReconnectExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhausted reconnects, got {other:?}"),
        }
        assert_eq!(transport.connect_attempts().await, 4);
        assert!(!supervisor.status().connected);
    }

    #[tokio::test]
    async fn open_resets_attempts_and_persists_credentials() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![
            Ok(vec![dropped()]),
            Ok(vec![dropped()]),
            Ok(vec![open(), dropped()]),
            Ok(vec![dropped()]),
            Ok(vec![dropped()]),
        ]));
        let (supervisor, credentials) = supervisor(transport.clone(), fast_policy(2));

        let outcome = supervisor
            .run(Arc::new(RecordingHandler::default()), CancellationToken::new())
            .await;

        // Two failures, an open that resets the counter, then two more retries before giving up.
        assert!(matches!(outcome, Err(SupervisorError::ReconnectExhausted { attempts: 2, .. })));
        assert_eq!(transport.connect_attempts().await, 5);
        assert_eq!(
            credentials.load().await.expect("load"),
            Some(SessionCredentials(json!({ "paired": true })))
        );
    }

    #[tokio::test]
    async fn dispatches_inbound_messages_but_skips_own() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![Ok(vec![
            open(),
            inbound("m1", "u1", "oi", false),
            inbound("m2", "self", "eco", true),
            closed(CloseReason::LoggedOut),
        ])]));
        let (supervisor, _) = supervisor(transport, fast_policy(0));
        let handler = Arc::new(RecordingHandler::default());

        let _ = supervisor.run(handler.clone(), CancellationToken::new()).await;

        let received = handler.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sender, CustomerId::new("u1"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_a_pending_backoff() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![Ok(vec![dropped()])]));
        let (supervisor, _) = supervisor(
            transport.clone(),
            ReconnectPolicy { max_attempts: 5, backoff: Duration::from_secs(5) },
        );
        let supervisor = Arc::new(supervisor);
        let cancel = CancellationToken::new();

        let running = {
            let supervisor = Arc::clone(&supervisor);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                supervisor.run(Arc::new(RecordingHandler::default()), cancel).await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(supervisor.status().reconnect_attempts, 1);
        cancel.cancel();

        let outcome = running.await.expect("join");
        assert!(outcome.is_ok());
        assert_eq!(transport.connect_attempts().await, 1);
        assert_eq!(supervisor.status().state, SupervisorState::Disconnected);
    }

    #[tokio::test]
    async fn send_requires_an_open_session() {
        let transport = Arc::new(ScriptedTransport::default());
        let (supervisor, _) = supervisor(transport, fast_policy(0));

        let outcome = supervisor
            .send_message(&CustomerId::new("u1"), OutboundContent::Text("oi".to_owned()), None)
            .await;
        assert!(matches!(outcome, Err(SupervisorError::NotConnected)));
        assert_eq!(supervisor.download_media(&MessageRef("m1".to_owned())).await, None);
    }

    #[tokio::test]
    async fn send_media_and_explicit_logout_end_run_cleanly() {
        let transport = Arc::new(ScriptedTransport::with_sessions(vec![Ok(vec![open()])]));
        let (supervisor, credentials) = supervisor(transport.clone(), fast_policy(5));
        let supervisor = Arc::new(supervisor);

        let running = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                supervisor
                    .run(Arc::new(RecordingHandler::default()), CancellationToken::new())
                    .await
            })
        };
        while !supervisor.status().connected {
            tokio::task::yield_now().await;
        }

        let media = OutboundContent::Media { bytes: vec![1, 2, 3], caption: Some("kit".into()) };
        supervisor.send_message(&CustomerId::new("u1"), media.clone(), None).await.expect("send");
        assert_eq!(supervisor.download_media(&MessageRef("m1".to_owned())).await, None);

        supervisor.disconnect().await.expect("disconnect");
        assert!(running.await.expect("join").is_ok());

        let state = transport.state.lock().await;
        assert_eq!(state.sent, vec![(CustomerId::new("u1"), media)]);
        assert_eq!(state.logouts, 1);
        assert_eq!(state.connect_attempts, 1);
        drop(state);
        assert_eq!(credentials.load().await.expect("load"), None);
    }
}
