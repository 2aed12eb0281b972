//! Directory layout of one deployment, relative to its home directory.
//!
//! ```text
//! messages/inbox/
//! messages/outbox/<connector-name>/
//! messages/failed/
//! logs/<connector-name>.log
//! ```

use std::path::{Path, PathBuf};

use proto::QueueError;

use crate::naming::validate_name;
use crate::store::ensure_dir;

/// Resolves queue and log directories under a home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueLayout {
    root: PathBuf,
}

impl QueueLayout {
    /// Creates a layout rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Home directory of the deployment.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared multi-producer inbox.
    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join("messages").join("inbox")
    }

    /// Parent of all per-connector outboxes.
    pub fn outbox_root(&self) -> PathBuf {
        self.root.join("messages").join("outbox")
    }

    /// Outbox of one connector instance.
    pub fn outbox_dir(&self, instance: &str) -> Result<PathBuf, QueueError> {
        validate_name(instance)?;
        Ok(self.outbox_root().join(instance))
    }

    /// Shared poison-message sink.
    pub fn failed_dir(&self) -> PathBuf {
        self.root.join("messages").join("failed")
    }

    /// Directory holding per-connector log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Log file name of one connector instance, relative to [`logs_dir`](Self::logs_dir).
    pub fn log_file_name(&self, instance: &str) -> Result<String, QueueError> {
        validate_name(instance)?;
        Ok(format!("{instance}.log"))
    }

    /// Creates inbox, failed and logs directories. Idempotent.
    pub fn ensure_shared(&self) -> Result<(), QueueError> {
        ensure_dir(&self.inbox_dir())?;
        ensure_dir(&self.failed_dir())?;
        ensure_dir(&self.logs_dir())
    }

    /// Creates the shared directories plus the outbox of `instance`.
    pub fn ensure_for(&self, instance: &str) -> Result<(), QueueError> {
        self.ensure_shared()?;
        ensure_dir(&self.outbox_dir(instance)?)
    }
}
