//! Canonical inbound message model written by connectors into the inbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ProtoError;

/// Schema version stamped on every inbound message.
pub const MESSAGE_VERSION: &str = "1.0";

/// Free-form key/value metadata carried alongside a message.
pub type Metadata = Map<String, Value>;

/// Generates a fresh message identifier.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_version() -> String {
    MESSAGE_VERSION.to_string()
}

fn default_media_type() -> String {
    "text".to_string()
}

/// Identifies which connector produced or consumes a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// Adapter kind, e.g. `cli`, `webhook`, `slack`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Configured instance name, e.g. `slack-main`.
    pub instance: String,
}

impl ConnectorInfo {
    /// Creates connector identity from adapter kind and instance name.
    pub fn new(kind: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            instance: instance.into(),
        }
    }
}

/// Platform-local identity of the message author.
///
/// Only `id` takes part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    /// Platform user id.
    pub id: String,
    /// Platform handle.
    pub username: String,
    /// Human-readable name, empty when the platform has none.
    #[serde(default)]
    pub display_name: String,
}

impl Sender {
    /// Creates a sender without a display name.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: String::new(),
        }
    }

    /// Sets the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

impl PartialEq for Sender {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Sender {}

impl std::hash::Hash for Sender {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// File or media reference attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Location of the attachment.
    #[serde(default)]
    pub url: String,
    /// Original file name.
    #[serde(default)]
    pub filename: String,
    /// Platform-specific fields kept verbatim.
    #[serde(flatten)]
    pub extra: Metadata,
}

impl Attachment {
    /// Creates an attachment from a url and file name.
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            extra: Metadata::new(),
        }
    }
}

/// Message payload. Attachments keep their display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Text body.
    pub text: String,
    /// Kind of payload: `text`, `image`, `file`, ...
    #[serde(default = "default_media_type")]
    pub media_type: String,
    /// Attachments in display order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Content {
    /// Creates plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_type: default_media_type(),
            attachments: Vec::new(),
        }
    }

    /// Appends an attachment after the existing ones.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Kind of conversation a message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Public or private channel.
    #[default]
    Channel,
    /// One-to-one direct message.
    Dm,
    /// Multi-party group chat.
    Group,
    /// Thread under another message.
    Thread,
}

impl std::fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationKind::Channel => write!(f, "channel"),
            ConversationKind::Dm => write!(f, "dm"),
            ConversationKind::Group => write!(f, "group"),
            ConversationKind::Thread => write!(f, "thread"),
        }
    }
}

impl std::str::FromStr for ConversationKind {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(ConversationKind::Channel),
            "dm" => Ok(ConversationKind::Dm),
            "group" => Ok(ConversationKind::Group),
            "thread" => Ok(ConversationKind::Thread),
            other => Err(ProtoError::InvalidConversationKind(other.to_string())),
        }
    }
}

/// Where a message was sent. `id` plus `thread_id` address the reply target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Platform conversation id.
    pub id: String,
    /// Conversation kind.
    #[serde(rename = "type", default)]
    pub kind: ConversationKind,
    /// Human-readable conversation name.
    #[serde(default)]
    pub name: String,
    /// Thread to reply into, if any.
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl Conversation {
    /// Creates an unnamed conversation of the given kind.
    pub fn new(id: impl Into<String>, kind: ConversationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: String::new(),
            thread_id: None,
        }
    }

    /// Sets the conversation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the thread id.
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

/// Standard inbound message (v1.0), immutable once written to the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Unique message id.
    #[serde(default = "new_message_id")]
    pub id: String,
    /// Creation time in UTC. Advisory only, never used for ordering.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Producing connector.
    pub connector: ConnectorInfo,
    /// Author.
    pub sender: Sender,
    /// Payload.
    pub content: Content,
    /// Source conversation.
    pub conversation: Conversation,
    /// Adapter-specific extras.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Creates a message with a fresh id, the current timestamp and empty metadata.
    pub fn new(
        connector: ConnectorInfo,
        sender: Sender,
        content: Content,
        conversation: Conversation,
    ) -> Self {
        Self {
            version: default_version(),
            id: new_message_id(),
            timestamp: Utc::now(),
            connector,
            sender,
            content,
            conversation,
            metadata: Metadata::new(),
        }
    }

    /// Replaces the metadata map.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Serializes to pretty-printed JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec_pretty(self).map_err(|e| ProtoError::Serialization(e.to_string()))
    }

    /// Parses a message, failing when a required section is absent or mis-shaped.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtoError> {
        serde_json::from_slice(bytes).map_err(|e| ProtoError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn sample() -> Message {
        Message::new(
            ConnectorInfo::new("cli", "cli-test"),
            Sender::new("u1", "sean").with_display_name("Sean"),
            Content::text("hello"),
            Conversation::new("cli", ConversationKind::Dm).with_name("cli"),
        )
    }

    #[test]
    fn new_fills_defaults() {
        let msg = sample();
        assert_eq!(msg.version, MESSAGE_VERSION);
        assert!(Uuid::parse_str(&msg.id).is_ok());
        assert!(msg.metadata.is_empty());
        assert_eq!(msg.content.media_type, "text");
        assert!(msg.content.attachments.is_empty());
        assert_eq!(msg.conversation.thread_id, None);
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let mut metadata = Metadata::new();
        metadata.insert("ts".to_string(), serde_json::json!("1712.01"));
        let msg = Message::new(
            ConnectorInfo::new("slack", "slack-main"),
            Sender::new("U1", "ana").with_display_name("Ana"),
            Content::text("see attached")
                .with_attachment(Attachment::new("https://x/a.png", "a.png"))
                .with_attachment(Attachment::new("https://x/b.pdf", "b.pdf")),
            Conversation::new("C1", ConversationKind::Thread)
                .with_name("general")
                .with_thread("T9"),
        )
        .with_metadata(metadata);

        let parsed = Message::from_json(&msg.to_json().expect("serialize")).expect("parse");
        assert_eq!(parsed, msg);
        assert_eq!(parsed.sender.username, "ana");
        assert_eq!(parsed.sender.display_name, "Ana");
        assert_eq!(parsed.content.attachments[0].filename, "a.png");
        assert_eq!(parsed.content.attachments[1].filename, "b.pdf");
    }

    #[test]
    fn round_trip_keeps_empty_collections() {
        let msg = sample();
        let parsed = Message::from_json(&msg.to_json().expect("serialize")).expect("parse");
        assert!(parsed.metadata.is_empty());
        assert!(parsed.content.attachments.is_empty());
        assert_eq!(parsed.timestamp, msg.timestamp);
    }

    #[test]
    fn empty_thread_id_is_written_as_null() {
        let json: Value = serde_json::from_slice(&sample().to_json().expect("serialize"))
            .expect("valid json");
        assert_eq!(json["conversation"]["thread_id"], Value::Null);
        assert_eq!(json["connector"]["type"], "cli");
        assert_eq!(json["conversation"]["type"], "dm");
    }

    #[test]
    fn missing_optional_sections_take_defaults() {
        let raw = br#"{
            "connector": {"type": "cli", "instance": "cli-1"},
            "sender": {"id": "u", "username": "u"},
            "content": {"text": "hi"},
            "conversation": {"id": "c"},
            "unknown_future_field": 42
        }"#;
        let msg = Message::from_json(raw).expect("parse");
        assert_eq!(msg.version, "1.0");
        assert!(!msg.id.is_empty());
        assert!(msg.metadata.is_empty());
        assert_eq!(msg.conversation.kind, ConversationKind::Channel);
        assert_eq!(msg.sender.display_name, "");
    }

    #[test]
    fn missing_required_section_is_malformed() {
        let raw = br#"{"connector": {"type": "cli", "instance": "x"}, "content": {"text": "hi"}}"#;
        let err = Message::from_json(raw).expect_err("sender is required");
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let raw = br#"{
            "connector": "cli",
            "sender": {"id": "u", "username": "u"},
            "content": {"text": "hi"},
            "conversation": {"id": "c"}
        }"#;
        assert!(Message::from_json(raw).is_err());
    }

    #[test]
    fn attachment_extra_fields_survive() {
        let raw = br#"{"url": "u", "filename": "f", "size": 10}"#;
        let attachment: Attachment = serde_json::from_slice(raw).expect("parse");
        assert_eq!(attachment.extra["size"], 10);
        let back = serde_json::to_value(&attachment).expect("serialize");
        assert_eq!(back["size"], 10);
    }

    #[test]
    fn sender_equality_uses_id_only() {
        let a = Sender::new("u1", "alice");
        let b = Sender::new("u1", "alice-renamed").with_display_name("Alice");
        assert_eq!(a, b);
        assert_ne!(a, Sender::new("u2", "alice"));
    }

    #[test]
    fn conversation_kind_display_and_parse_round_trip() {
        for kind in [
            ConversationKind::Channel,
            ConversationKind::Dm,
            ConversationKind::Group,
            ConversationKind::Thread,
        ] {
            assert_eq!(ConversationKind::from_str(&kind.to_string()).expect("parse"), kind);
        }
        assert!(ConversationKind::from_str("room").is_err());
    }
}
