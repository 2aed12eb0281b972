//! Error types shared across the workspace.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Connector error.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Worker supervision error.
    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// No connector implementation is registered for this type tag.
    #[error("Unknown connector type: {0}")]
    UnknownConnectorType(String),

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Queue directory errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem operation on a queue path failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A queue file could not be parsed.
    #[error("Malformed entry {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Message could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A name used to build a queue path is unusable.
    #[error("Invalid queue name: {0:?}")]
    InvalidName(String),

    /// Outgoing message addressed to a different connector instance.
    #[error("Message for '{found}' placed in outbox '{expected}'")]
    Misrouted { expected: String, found: String },

    /// No free file name could be found.
    #[error("No free file name in {}", .0.display())]
    NameExhausted(PathBuf),
}

impl QueueError {
    /// Wraps an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Connector errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Platform connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Sending a message to the platform failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Platform authentication failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Required configuration missing or invalid.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Queue access failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Connector has been closed.
    #[error("Channel closed")]
    Closed,
}

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Registration name already in use.
    #[error("Connector already registered: {0}")]
    DuplicateName(String),

    /// Worker process could not be launched.
    #[error("Failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` called on a running supervisor.
    #[error("Supervisor already started")]
    AlreadyStarted,
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Required fields absent or of the wrong shape.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Invalid conversation kind string value.
    #[error("Invalid conversation kind: {0}")]
    InvalidConversationKind(String),

    /// Generic serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_config_error_variant() {
        let err = ConfigError::MissingField("token".to_string());
        assert!(err.to_string().contains("Missing required field"));
    }

    #[test]
    fn queue_io_error_mentions_path() {
        let err = QueueError::io(
            "/tmp/inbox",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/inbox"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn wraps_config_error_into_channel_error() {
        let err: ChannelError = ConfigError::MissingField("bot_token".to_string()).into();
        assert!(matches!(err, ChannelError::Config(_)));
        assert!(err.to_string().contains("bot_token"));
    }

    #[test]
    fn wraps_supervisor_and_queue_errors() {
        let sup: Error = SupervisorError::DuplicateName("cli".to_string()).into();
        assert!(sup.to_string().contains("Supervisor error"));

        let queue: Error = QueueError::InvalidName("a/b".to_string()).into();
        assert!(queue.to_string().contains("Queue error"));
    }

    #[test]
    fn misrouted_error_names_both_instances() {
        let err = QueueError::Misrouted {
            expected: "cli-1".to_string(),
            found: "cli-2".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("cli-1"));
        assert!(text.contains("cli-2"));
    }
}
