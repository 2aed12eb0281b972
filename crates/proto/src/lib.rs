//! Shared protocol types for connectors, the queue and the supervisor.
//!
//! This crate defines the canonical inbound/outbound message schema, the
//! cooperative shutdown handle and strongly-typed error enums shared across
//! the workspace.

pub mod error;
pub mod message;
pub mod outgoing;
pub mod shutdown;

/// Re-export of all protocol error types.
pub use error::*;
/// Re-export of inbound message types.
pub use message::{
    Attachment, ConnectorInfo, Content, Conversation, ConversationKind, MESSAGE_VERSION, Message,
    Metadata, Sender, new_message_id,
};
/// Re-export of the outbound message type.
pub use outgoing::OutgoingMessage;
/// Re-export of the shutdown flag.
pub use shutdown::{Shutdown, ShutdownSignal};
