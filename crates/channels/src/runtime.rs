//! Connector lifecycle: connect, run the event loop next to the outbox
//! poller, always disconnect.

use std::path::PathBuf;
use std::time::Duration;

use proto::{
    ChannelError, ConnectorInfo, Content, Conversation, Message, Sender, Shutdown, ShutdownSignal,
};
use queue::{Inbox, Outbox, QueueLayout};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::adapter::Connector;
use crate::config::ConnectorConfig;
use crate::registry::ConnectorSpec;

/// Outbox poll period used when the connector config sets none.
pub const DEFAULT_OUTBOX_POLL_INTERVAL: Duration = Duration::from_secs(2);

const PREVIEW_CHARS: usize = 80;

/// Lifecycle state of one connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// Built, `run` not called yet.
    Created,
    /// Queue directories ready, `connect` in progress.
    Connecting,
    /// Event loop and outbox poller active.
    Running,
    /// Loops finished, `disconnect` in progress.
    Disconnecting,
    /// Clean end of run.
    Stopped,
    /// Connect or event loop failed.
    Crashed,
}

impl ConnectorState {
    /// `Stopped` and `Crashed` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }
}

/// Outcome of one outbox pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Entries handed to `send_message` successfully.
    pub sent: usize,
    /// Entries whose send failed; they are not requeued.
    pub failed: usize,
}

impl DeliveryReport {
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.failed == 0
    }
}

/// Everything a connector needs from its host: identity, settings and queues.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    name: String,
    kind: String,
    config: ConnectorConfig,
    layout: QueueLayout,
    inbox: Inbox,
    outbox: Outbox,
    outbox_poll_interval: Duration,
}

impl ConnectorContext {
    /// Binds `spec` to the queues under `layout`. Does not touch the disk.
    pub fn new(spec: &ConnectorSpec, layout: QueueLayout) -> Result<Self, ChannelError> {
        let outbox_poll_interval = match spec.config.get_f64("outbox_poll_interval", None)? {
            Some(_) => spec
                .config
                .get_secs("outbox_poll_interval", DEFAULT_OUTBOX_POLL_INTERVAL)?,
            None => spec
                .config
                .get_secs("poll_interval", DEFAULT_OUTBOX_POLL_INTERVAL)?,
        };

        Ok(Self {
            name: spec.name.clone(),
            kind: spec.kind.as_str().to_string(),
            config: spec.config.clone(),
            inbox: Inbox::new(&layout),
            outbox: Outbox::new(&layout, &spec.name)?,
            layout,
            outbox_poll_interval,
        })
    }

    /// Instance name, also the outbox routing key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adapter kind tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn layout(&self) -> &QueueLayout {
        &self.layout
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_poll_interval(&self) -> Duration {
        self.outbox_poll_interval
    }

    /// Connector descriptor stamped into every produced message.
    pub fn connector_info(&self) -> ConnectorInfo {
        ConnectorInfo::new(self.kind.clone(), self.name.clone())
    }

    /// Builds an inbound message attributed to this connector.
    pub fn new_message(
        &self,
        sender: Sender,
        content: Content,
        conversation: Conversation,
    ) -> Message {
        Message::new(self.connector_info(), sender, content, conversation)
    }

    /// Publishes `msg` into the shared inbox.
    pub fn write_to_inbox(&self, msg: &Message) -> Result<PathBuf, ChannelError> {
        let path = self.inbox.enqueue(msg)?;
        info!(
            "Inbox: [{}] {}: {}",
            msg.connector.kind,
            msg.sender.username,
            preview(&msg.content.text)
        );
        Ok(path)
    }
}

/// Drives one [`Connector`] through its lifecycle.
pub struct ConnectorRuntime {
    connector: Box<dyn Connector>,
    ctx: ConnectorContext,
    state: watch::Sender<ConnectorState>,
}

impl ConnectorRuntime {
    pub fn new(connector: Box<dyn Connector>, ctx: ConnectorContext) -> Self {
        let (state, _) = watch::channel(ConnectorState::Created);
        Self {
            connector,
            ctx,
            state,
        }
    }

    pub fn context(&self) -> &ConnectorContext {
        &self.ctx
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    /// Observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    /// Runs until `shutdown` triggers or the connector's loop ends.
    ///
    /// `disconnect` is attempted on every path once connecting has begun.
    /// Returns `Ok` for a clean stop and the failure otherwise.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<(), ChannelError> {
        let name = self.ctx.name.clone();
        info!(
            connector = %name,
            kind = %self.connector.connector_type(),
            "Starting connector"
        );
        self.set_state(ConnectorState::Connecting);

        if let Err(e) = self.ctx.layout.ensure_for(&name) {
            error!(connector = %name, "Queue directories unavailable: {e}");
            self.set_state(ConnectorState::Crashed);
            return Err(e.into());
        }
        info!(
            connector = %name,
            "Inbox: {}, outbox: {}",
            self.ctx.inbox.dir().display(),
            self.ctx.outbox.dir().display()
        );

        let connected = tokio::select! {
            result = self.connector.connect(&self.ctx) => Some(result),
            _ = shutdown.triggered() => None,
        };

        let outcome = match connected {
            None => {
                info!(connector = %name, "Shutdown requested while connecting");
                Ok(())
            }
            Some(Err(e)) => {
                error!(connector = %name, "Connect failed: {e}");
                Err(e)
            }
            Some(Ok(())) => {
                info!(connector = %name, "Connected");
                self.set_state(ConnectorState::Running);
                self.run_connected(shutdown).await
            }
        };

        self.set_state(ConnectorState::Disconnecting);
        if let Err(e) = self.connector.disconnect().await {
            warn!(connector = %name, "Disconnect failed: {e}");
        }

        match outcome {
            Ok(()) => {
                self.set_state(ConnectorState::Stopped);
                info!(connector = %name, "Connector stopped");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectorState::Crashed);
                error!(connector = %name, "Connector crashed: {e}");
                Err(e)
            }
        }
    }

    /// Delivers everything currently in this connector's outbox.
    pub async fn process_outbox(&self) -> Result<DeliveryReport, ChannelError> {
        deliver_outbox(self.connector.as_ref(), &self.ctx).await
    }

    async fn run_connected(&self, mut shutdown: ShutdownSignal) -> Result<(), ChannelError> {
        let connector = self.connector.as_ref();
        let ctx = &self.ctx;
        // Local stop flag: ends the poller when the event loop returns on its own.
        let stop = Shutdown::new();

        let event_loop = async {
            let result = connector.run_loop(ctx, stop.signal()).await;
            stop.trigger();
            result
        };
        let work = async { tokio::join!(event_loop, poll_outbox(connector, ctx, stop.signal())).0 };
        let forward = async {
            shutdown.triggered().await;
            info!(connector = %ctx.name, "Shutdown requested");
            stop.trigger();
            std::future::pending::<()>().await
        };

        tokio::select! {
            result = work => result,
            () = forward => Ok(()),
        }
    }

    fn set_state(&self, next: ConnectorState) {
        let prev = self.state.send_replace(next);
        debug!(connector = %self.ctx.name, "State {prev:?} -> {next:?}");
    }
}

/// Drains the outbox once and hands each reply to `connector`.
///
/// Send failures are logged and counted; the entry is not retried.
pub async fn deliver_outbox(
    connector: &dyn Connector,
    ctx: &ConnectorContext,
) -> Result<DeliveryReport, ChannelError> {
    let mut report = DeliveryReport::default();
    for entry in ctx.outbox.drain()? {
        let msg = entry.record;
        match connector.send_message(&msg).await {
            Ok(()) => {
                report.sent += 1;
                info!("Outbox: sent to {}: {}", msg.conversation_id, preview(&msg.text));
            }
            Err(e) => {
                report.failed += 1;
                warn!(file = %entry.file_name, "Failed to send message {}: {e}", msg.id);
            }
        }
    }
    Ok(report)
}

async fn poll_outbox(connector: &dyn Connector, ctx: &ConnectorContext, mut stop: ShutdownSignal) {
    loop {
        if stop.is_triggered() {
            break;
        }
        match deliver_outbox(connector, ctx).await {
            Ok(report) if !report.is_empty() => debug!(
                connector = %ctx.name,
                "Outbox pass: {} sent, {} failed",
                report.sent,
                report.failed
            ),
            Ok(_) => {}
            Err(e) => error!(connector = %ctx.name, "Outbox poll error: {e}"),
        }
        tokio::select! {
            _ = tokio::time::sleep(ctx.outbox_poll_interval) => {}
            _ = stop.triggered() => break,
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
