//! Chat transport seam for vendedor.
//!
//! - **Events** (`events`) - inbound event model and outbound content
//! - **Transport** (`transport`) - `ChatTransport` / `ChatSession` traits and the noop transport
//! - **Supervisor** (`supervisor`) - session lifecycle with bounded, cancellable reconnects
//!
//! ```text
//! ChatTransport → ConnectionSupervisor → InboundHandler (message pipeline)
//!                        ↑
//!              OutboundSender ← replies
//! ```

pub mod events;
pub mod supervisor;
pub mod transport;

pub use events::{
    ChatEvent, CloseReason, ConnectionState, ConnectionUpdate, InboundMessage, MessagePayload,
    MessageRef, OutboundContent,
};
pub use supervisor::{
    on_close, CloseDecision, ConnectionSupervisor, ReconnectPolicy, StopReason, SupervisorError,
    SupervisorState, SupervisorStatus,
};
pub use transport::{
    ChatSession, ChatTransport, InboundHandler, NoopChatTransport, OutboundSender, TransportError,
};
