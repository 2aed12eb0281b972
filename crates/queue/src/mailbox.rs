//! Typed handles over the inbox and a connector's outbox.

use std::path::{Path, PathBuf};

use proto::{Message, OutgoingMessage, QueueError};

use crate::layout::QueueLayout;
use crate::store::{self, Entry};

/// Shared inbox: every connector writes, only the agent drains.
#[derive(Debug, Clone)]
pub struct Inbox {
    dir: PathBuf,
    failed: PathBuf,
}

impl Inbox {
    /// Binds to the inbox of `layout`.
    pub fn new(layout: &QueueLayout) -> Self {
        Self {
            dir: layout.inbox_dir(),
            failed: layout.failed_dir(),
        }
    }

    /// Directory backing this inbox.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publishes an inbound message named after its connector instance.
    pub fn enqueue(&self, msg: &Message) -> Result<PathBuf, QueueError> {
        store::enqueue(&self.dir, msg)
    }

    /// Claims every inbound message present now.
    pub fn drain(&self) -> Result<Vec<Entry<Message>>, QueueError> {
        store::drain(&self.dir, &self.failed)
    }

    /// File names waiting in the inbox, oldest first.
    pub fn pending(&self) -> Result<Vec<String>, QueueError> {
        store::pending(&self.dir)
    }
}

/// Outbox of a single connector instance: the agent writes, the connector drains.
#[derive(Debug, Clone)]
pub struct Outbox {
    instance: String,
    dir: PathBuf,
    failed: PathBuf,
}

impl Outbox {
    /// Binds to the outbox of `instance`.
    pub fn new(layout: &QueueLayout, instance: &str) -> Result<Self, QueueError> {
        Ok(Self {
            instance: instance.to_string(),
            dir: layout.outbox_dir(instance)?,
            failed: layout.failed_dir(),
        })
    }

    /// Connector instance owning this outbox.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Directory backing this outbox.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Publishes a reply. Fails when the message is addressed to another instance.
    pub fn enqueue(&self, msg: &OutgoingMessage) -> Result<PathBuf, QueueError> {
        if msg.connector_instance != self.instance {
            return Err(QueueError::Misrouted {
                expected: self.instance.clone(),
                found: msg.connector_instance.clone(),
            });
        }
        store::enqueue(&self.dir, msg)
    }

    /// Claims every reply present now, oldest first. Replies whose routing
    /// key names another instance are quarantined.
    pub fn drain(&self) -> Result<Vec<Entry<OutgoingMessage>>, QueueError> {
        store::drain_checked(&self.dir, &self.failed, |msg: &OutgoingMessage| {
            if msg.connector_instance == self.instance {
                Ok(())
            } else {
                Err(QueueError::Misrouted {
                    expected: self.instance.clone(),
                    found: msg.connector_instance.clone(),
                }
                .to_string())
            }
        })
    }

    /// File names waiting in the outbox, oldest first.
    pub fn pending(&self) -> Result<Vec<String>, QueueError> {
        store::pending(&self.dir)
    }
}
