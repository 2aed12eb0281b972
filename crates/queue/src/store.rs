//! Enqueue / drain / quarantine primitives on a single queue directory.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use proto::{Message, OutgoingMessage, QueueError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::naming::{
    OUTBOX_FILE_PREFIX, entry_file_name, is_queue_file, quarantine_candidate, validate_name,
};

const MAX_NAME_ATTEMPTS: usize = 64;

/// A record type that can live in a queue directory.
pub trait QueueRecord: Sized {
    /// Prefix of the published file name.
    fn file_prefix(&self) -> &str;

    /// Full serialized payload.
    fn to_bytes(&self) -> Result<Vec<u8>, QueueError>;

    /// Parses a payload; the error string is the reason shown when quarantining.
    fn from_bytes(bytes: &[u8]) -> Result<Self, String>;
}

impl QueueRecord for Message {
    fn file_prefix(&self) -> &str {
        &self.connector.instance
    }

    fn to_bytes(&self) -> Result<Vec<u8>, QueueError> {
        self.to_json()
            .map_err(|e| QueueError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        Message::from_json(bytes).map_err(|e| e.to_string())
    }
}

impl QueueRecord for OutgoingMessage {
    fn file_prefix(&self) -> &str {
        OUTBOX_FILE_PREFIX
    }

    fn to_bytes(&self) -> Result<Vec<u8>, QueueError> {
        self.to_json()
            .map_err(|e| QueueError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        OutgoingMessage::from_json(bytes).map_err(|e| e.to_string())
    }
}

/// One claimed queue entry. Its file no longer exists once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    /// Name the file had in the queue directory.
    pub file_name: String,
    /// Parsed payload.
    pub record: T,
}

/// Creates `dir` and its parents. Existing content is left untouched.
pub fn ensure_dir(dir: &Path) -> Result<(), QueueError> {
    fs::create_dir_all(dir).map_err(|e| QueueError::io(dir, e))
}

/// Publishes `record` in `dir` and returns the final path.
///
/// The payload is written in full to a hidden temporary file and then
/// hard-linked to its final name, so readers never see a partial file and
/// an existing entry is never overwritten.
pub fn enqueue<T: QueueRecord>(dir: &Path, record: &T) -> Result<PathBuf, QueueError> {
    let prefix = record.file_prefix();
    validate_name(prefix)?;
    let payload = record.to_bytes()?;
    ensure_dir(dir)?;

    let tmp = write_temp(dir, &payload)?;
    let result = publish(&tmp, dir, prefix);
    if let Err(e) = fs::remove_file(&tmp) {
        warn!(path = %tmp.display(), "Failed to remove temporary queue file: {e}");
    }
    result
}

fn write_temp(dir: &Path, payload: &[u8]) -> Result<PathBuf, QueueError> {
    let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .map_err(|e| QueueError::io(&tmp, e))?;
    let written = file.write_all(payload).and_then(|()| file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(QueueError::io(&tmp, e));
    }
    Ok(tmp)
}

fn publish(tmp: &Path, dir: &Path, prefix: &str) -> Result<PathBuf, QueueError> {
    let mut at = Utc::now();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let target = dir.join(entry_file_name(prefix, at));
        match fs::hard_link(tmp, &target) {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %target.display(), "Queue name taken, regenerating");
                at = next_stamp(at);
            }
            Err(e) => return Err(QueueError::io(&target, e)),
        }
    }
    Err(QueueError::NameExhausted(dir.to_path_buf()))
}

fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::microseconds(1))
}

/// Lists queue file names in `dir` in lexicographic (chronological) order.
/// A missing directory is an empty queue.
pub fn pending(dir: &Path) -> Result<Vec<String>, QueueError> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(QueueError::io(dir, e)),
    };

    let mut names = Vec::new();
    for item in read {
        let item = item.map_err(|e| QueueError::io(dir, e))?;
        let is_file = item.file_type().map(|t| t.is_file()).unwrap_or(false);
        let name = item.file_name().to_string_lossy().into_owned();
        if is_file && is_queue_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Claims every entry present in `dir` right now.
///
/// Each file is either parsed, returned and deleted, or moved to
/// `failed_dir`. Files appearing during the drain wait for the next call.
pub fn drain<T: QueueRecord>(dir: &Path, failed_dir: &Path) -> Result<Vec<Entry<T>>, QueueError> {
    drain_checked(dir, failed_dir, |_: &T| Ok(()))
}

/// Like [`drain`], with an extra acceptance check; rejected records are
/// quarantined like parse failures.
pub fn drain_checked<T, F>(
    dir: &Path,
    failed_dir: &Path,
    check: F,
) -> Result<Vec<Entry<T>>, QueueError>
where
    T: QueueRecord,
    F: Fn(&T) -> Result<(), String>,
{
    let names = pending(dir)?;
    let mut entries = Vec::with_capacity(names.len());

    for file_name in names {
        let path = dir.join(&file_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Entry claimed by another reader");
                continue;
            }
            Err(e) => {
                error!(path = %path.display(), "Failed to read queue entry: {e}");
                continue;
            }
        };

        let parsed = T::from_bytes(&bytes).and_then(|record| check(&record).map(|()| record));
        match parsed {
            Ok(record) => match fs::remove_file(&path) {
                Ok(()) => entries.push(Entry { file_name, record }),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Entry claimed by another reader");
                }
                Err(e) => {
                    error!(path = %path.display(), "Failed to delete queue entry, skipping: {e}");
                }
            },
            Err(reason) => {
                let malformed = QueueError::Malformed {
                    path: path.clone(),
                    reason,
                };
                warn!("{malformed}");
                match quarantine(&path, failed_dir) {
                    Ok(target) => {
                        warn!(from = %path.display(), to = %target.display(), "Entry quarantined")
                    }
                    Err(e) => error!(path = %path.display(), "Quarantine failed: {e}"),
                }
            }
        }
    }

    Ok(entries)
}

/// Moves `path` into `failed_dir` under its own name, adding a numeric
/// suffix when that name is taken. Never overwrites.
///
/// Placement is a hard link followed by removal of the source. Where the
/// filesystem refuses hard links the file is renamed into a free name
/// instead.
pub fn quarantine(path: &Path, failed_dir: &Path) -> Result<PathBuf, QueueError> {
    quarantine_with(path, failed_dir, |from, to| fs::hard_link(from, to))
}

fn quarantine_with<L>(path: &Path, failed_dir: &Path, link: L) -> Result<PathBuf, QueueError>
where
    L: Fn(&Path, &Path) -> std::io::Result<()>,
{
    ensure_dir(failed_dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| QueueError::InvalidName(path.display().to_string()))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let target = failed_dir.join(quarantine_candidate(&file_name, attempt));
        match link(path, &target) {
            Ok(()) => {
                fs::remove_file(path).map_err(|e| QueueError::io(path, e))?;
                return Ok(target);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => {
                debug!(path = %path.display(), "Hard link refused, renaming instead: {e}");
                if fs::symlink_metadata(&target).is_ok() {
                    continue;
                }
                fs::rename(path, &target).map_err(|e| QueueError::io(&target, e))?;
                return Ok(target);
            }
        }
    }
    Err(QueueError::NameExhausted(failed_dir.to_path_buf()))
}
