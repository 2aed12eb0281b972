//! Outbound reply model consumed by connectors from their outbox.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;
use crate::message::{Metadata, new_message_id};

/// Reply written by the agent into `outbox/<connector_instance>/`.
///
/// `connector_instance` is the routing key and must equal the name of the
/// outbox directory the file is placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Unique message id.
    #[serde(default = "new_message_id")]
    pub id: String,
    /// Connector instance that must deliver this message.
    pub connector_instance: String,
    /// Target conversation on the platform.
    pub conversation_id: String,
    /// Text to send.
    pub text: String,
    /// Thread to reply into, if any.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Delivery hints understood by the connector (e.g. `callback_url`).
    #[serde(default)]
    pub metadata: Metadata,
}

impl OutgoingMessage {
    /// Creates an outgoing message with a fresh id.
    pub fn new(
        connector_instance: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: new_message_id(),
            connector_instance: connector_instance.into(),
            conversation_id: conversation_id.into(),
            text: text.into(),
            thread_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Replies into the given thread.
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns a string metadata value.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Serializes to pretty-printed JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec_pretty(self).map_err(|e| ProtoError::Serialization(e.to_string()))
    }

    /// Parses an outgoing message; `connector_instance`, `conversation_id`
    /// and `text` are required.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtoError> {
        serde_json::from_slice(bytes).map_err(|e| ProtoError::Malformed(e.to_string()))
    }
}
