//! Filesystem queue shared by connectors and the agent.
//!
//! Producers publish complete JSON files under unique, chronologically
//! sortable names; a single consumer per directory drains them, deleting
//! each parsed file and moving unparseable ones to `messages/failed/`.
//! Delivery is at-most-once per file.

pub mod layout;
pub mod mailbox;
pub mod naming;
pub mod store;

/// Directory layout of a deployment.
pub use layout::QueueLayout;
/// Typed inbox/outbox handles.
pub use mailbox::{Inbox, Outbox};
/// File naming helpers.
pub use naming::{OUTBOX_FILE_PREFIX, TIMESTAMP_FORMAT, entry_file_name, validate_name};
/// Low-level queue primitives.
pub use store::{Entry, QueueRecord, drain, drain_checked, enqueue, ensure_dir, pending, quarantine};
