//! Runs each connector as its own OS process and keeps it alive.
//!
//! A crash of one worker never affects the others or the supervisor:
//! every worker has its own task that waits on the child, applies the
//! restart policy and, on shutdown, escalates from SIGTERM to SIGKILL.

pub mod launcher;
pub mod registration;
pub mod supervisor;
mod worker;

/// Worker process construction.
pub use launcher::{ProcessLauncher, WorkerLauncher};
/// Declarative connector entry.
pub use registration::ConnectorRegistration;
/// Supervisor and its status snapshot.
pub use supervisor::{DEFAULT_SHUTDOWN_TIMEOUT, Supervisor, WorkerStatus};
/// Restart behaviour.
pub use worker::RestartPolicy;
