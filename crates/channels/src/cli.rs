//! Local terminal connector for testing the message round trip.

use async_trait::async_trait;
use proto::{
    ChannelError, ConfigError, Content, Conversation, ConversationKind, OutgoingMessage, Sender,
    ShutdownSignal,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;
use tracing::info;

use crate::adapter::Connector;
use crate::registry::ConnectorSpec;
use crate::runtime::ConnectorContext;

const DEFAULT_USERNAME: &str = "user";
const CLI_CONVERSATION: &str = "cli";

type InputLines = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

/// CLI connector: stdin lines become inbound messages, replies go to stdout.
pub struct CliConnector {
    username: String,
    input: Mutex<InputLines>,
    output: Mutex<Output>,
}

impl CliConnector {
    /// Creates a connector on the process stdin/stdout.
    pub fn from_spec(spec: &ConnectorSpec) -> Result<Self, ConfigError> {
        Ok(Self::with_io(
            spec.config.get_string_or("username", DEFAULT_USERNAME, None),
            tokio::io::stdin(),
            tokio::io::stdout(),
        ))
    }

    /// Creates a connector over arbitrary streams.
    pub fn with_io(
        username: impl Into<String>,
        input: impl AsyncRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let input: Box<dyn AsyncRead + Send + Unpin> = Box::new(input);
        Self {
            username: username.into(),
            input: Mutex::new(BufReader::new(input).lines()),
            output: Mutex::new(Box::new(output)),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    async fn write_out(&self, text: &str) -> Result<(), ChannelError> {
        let mut output = self.output.lock().await;
        output
            .write_all(text.as_bytes())
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        output
            .flush()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

#[async_trait]
impl Connector for CliConnector {
    fn connector_type(&self) -> &str {
        "cli"
    }

    async fn connect(&mut self, ctx: &ConnectorContext) -> Result<(), ChannelError> {
        info!("CLI connector '{}' ready (user: {})", ctx.name(), self.username);
        Ok(())
    }

    async fn run_loop(
        &self,
        ctx: &ConnectorContext,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ChannelError> {
        let mut lines = self.input.lock().await;
        self.write_out(&format_banner(ctx.name())).await?;

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line
                    .map_err(|e| ChannelError::ConnectionFailed(format!("stdin: {e}")))?,
                _ = shutdown.triggered() => break,
            };
            let Some(line) = line else {
                info!("CLI input closed");
                break;
            };
            let Some(text) = normalize_input_line(&line) else {
                continue;
            };
            if is_quit_command(&text) {
                break;
            }

            let msg = ctx.new_message(
                Sender::new(self.username.clone(), self.username.clone())
                    .with_display_name(self.username.clone()),
                Content::text(text),
                Conversation::new(CLI_CONVERSATION, ConversationKind::Dm).with_name(CLI_CONVERSATION),
            );
            ctx.write_to_inbox(&msg)?;
            self.write_out("  (message delivered to inbox)\n").await?;
        }

        info!("CLI connector loop finished");
        Ok(())
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<(), ChannelError> {
        self.write_out(&format_reply(msg)).await
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        info!("CLI connector stopped");
        Ok(())
    }
}

/// Trims an input line and drops empty lines.
fn normalize_input_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Returns true when input requests the loop to end.
fn is_quit_command(line: &str) -> bool {
    line == "/quit" || line == "/exit"
}

fn format_banner(name: &str) -> String {
    format!("CLI connector '{name}' ready. Type messages, /quit to stop.\n")
}

fn format_reply(msg: &OutgoingMessage) -> String {
    format!("\n[seed] {}\n\n", msg.text)
}
