//! Shared connector trait.

use async_trait::async_trait;
use proto::{ChannelError, OutgoingMessage, ShutdownSignal};

use crate::runtime::ConnectorContext;

/// Platform adapter driven by [`ConnectorRuntime`](crate::ConnectorRuntime).
///
/// The runtime calls `connect`, then runs `run_loop` while polling the
/// outbox into `send_message`, and always finishes with `disconnect`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Adapter kind written into produced messages (`cli`, `webhook`, ...).
    fn connector_type(&self) -> &str;

    /// Authenticate and open platform resources.
    async fn connect(&mut self, ctx: &ConnectorContext) -> Result<(), ChannelError>;

    /// Main event loop. Must return soon after `shutdown` triggers.
    async fn run_loop(
        &self,
        ctx: &ConnectorContext,
        shutdown: ShutdownSignal,
    ) -> Result<(), ChannelError>;

    /// Deliver one outbound message to the platform.
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), ChannelError>;

    /// Release platform resources. Best-effort.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;
}
