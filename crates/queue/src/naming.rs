//! Queue file naming: `<prefix>_<YYYYMMDD_HHMMSS_ffffff>.json`.

use chrono::{DateTime, Utc};
use proto::QueueError;

/// `strftime` pattern of the timestamp embedded in queue file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
/// Prefix used for every outbox file.
pub const OUTBOX_FILE_PREFIX: &str = "out";
/// Extension of published queue files.
pub const QUEUE_FILE_EXTENSION: &str = ".json";

/// Renders the microsecond-resolution UTC timestamp token.
pub fn timestamp_token(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Builds the published file name for an entry written at `at`.
pub fn entry_file_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{prefix}_{}{QUEUE_FILE_EXTENSION}", timestamp_token(at))
}

/// Returns true for names a drain should consider. Hidden files are
/// in-flight temporaries and never match.
pub fn is_queue_file(name: &str) -> bool {
    !name.starts_with('.') && name.ends_with(QUEUE_FILE_EXTENSION)
}

/// Candidate name inside `failed/` for the n-th placement attempt.
pub(crate) fn quarantine_candidate(file_name: &str, attempt: usize) -> String {
    if attempt == 0 {
        return file_name.to_string();
    }
    match file_name.strip_suffix(QUEUE_FILE_EXTENSION) {
        Some(stem) => format!("{stem}.{attempt}{QUEUE_FILE_EXTENSION}"),
        None => format!("{file_name}.{attempt}"),
    }
}

/// Rejects names that cannot be used as a single path component.
pub fn validate_name(name: &str) -> Result<(), QueueError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.trim() != name;
    if invalid {
        Err(QueueError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
