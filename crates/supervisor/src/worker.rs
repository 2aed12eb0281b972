//! Per-worker supervision task.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use proto::{ShutdownSignal, SupervisorError};
use tokio::process::Child;
use tracing::{error, info, warn};

use crate::launcher::WorkerLauncher;
use crate::registration::ConnectorRegistration;

/// What the supervisor does when a worker dies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestartPolicy {
    pub restart_on_crash: bool,
    pub restart_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            restart_on_crash: true,
            restart_delay: Duration::from_secs(5),
        }
    }
}

/// Live view of one worker, shared between its task and `status()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkerSlot {
    pub kind: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub restarts: u32,
}

impl WorkerSlot {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            pid: None,
            alive: false,
            restarts: 0,
        }
    }
}

pub(crate) type WorkerTable = Arc<DashMap<String, WorkerSlot>>;

pub(crate) struct WorkerTask {
    pub registration: ConnectorRegistration,
    pub launcher: Arc<dyn WorkerLauncher>,
    pub table: WorkerTable,
    pub policy: RestartPolicy,
    pub shutdown_timeout: Duration,
}

impl WorkerTask {
    /// Keeps one worker alive until `shutdown` triggers, then stops it.
    pub async fn supervise(self, mut shutdown: ShutdownSignal) {
        let name = self.registration.name.clone();
        let mut launches: u32 = 0;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            match self.spawn() {
                Ok(mut child) => {
                    let pid = child.id();
                    self.update(|slot| {
                        slot.pid = pid;
                        slot.alive = true;
                        if launches > 0 {
                            slot.restarts += 1;
                        }
                    });
                    info!(connector = %name, pid = ?pid, "Worker started");

                    let exited = tokio::select! {
                        status = child.wait() => Some(status),
                        _ = shutdown.triggered() => None,
                    };
                    match exited {
                        None => {
                            terminate(&name, &mut child, self.shutdown_timeout).await;
                            self.mark_dead();
                            break;
                        }
                        Some(Ok(status)) => {
                            self.mark_dead();
                            log_exit(&name, status);
                        }
                        Some(Err(e)) => {
                            self.mark_dead();
                            error!(connector = %name, "Failed to wait for worker: {e}");
                        }
                    }
                }
                Err(e) => {
                    self.mark_dead();
                    error!(connector = %name, "{e}");
                }
            }
            launches += 1;

            if !self.policy.restart_on_crash {
                break;
            }
            info!(
                connector = %name,
                "Restarting worker in {:.1}s",
                self.policy.restart_delay.as_secs_f64()
            );
            tokio::select! {
                _ = tokio::time::sleep(self.policy.restart_delay) => {}
                _ = shutdown.triggered() => break,
            }
        }
    }

    fn spawn(&self) -> Result<Child, SupervisorError> {
        let mut cmd = self.launcher.command(&self.registration)?;
        cmd.kill_on_drop(true);
        cmd.spawn().map_err(|source| SupervisorError::Spawn {
            name: self.registration.name.clone(),
            source,
        })
    }

    fn update(&self, apply: impl FnOnce(&mut WorkerSlot)) {
        if let Some(mut slot) = self.table.get_mut(&self.registration.name) {
            apply(&mut slot);
        }
    }

    fn mark_dead(&self) {
        self.update(|slot| {
            slot.pid = None;
            slot.alive = false;
        });
    }
}

fn log_exit(name: &str, status: ExitStatus) {
    if status.success() {
        info!(connector = %name, exit_code = 0, "Worker exited");
    } else {
        warn!(
            connector = %name,
            exit_code = ?status.code(),
            "Worker died ({status})"
        );
    }
}

/// SIGTERM, bounded wait, then SIGKILL. Errors are logged, never returned.
pub(crate) async fn terminate(name: &str, child: &mut Child, timeout: Duration) {
    let Some(pid) = child.id() else {
        return;
    };
    request_stop(name, pid, child);

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => info!(connector = %name, exit_code = ?status.code(), "Worker stopped"),
        Ok(Err(e)) => warn!(connector = %name, "Failed to wait for worker: {e}"),
        Err(_) => {
            warn!(
                connector = %name,
                pid,
                "Worker did not stop within {:.1}s; killing",
                timeout.as_secs_f64()
            );
            if let Err(e) = child.kill().await {
                warn!(connector = %name, "Kill failed: {e}");
            }
        }
    }
}

#[cfg(unix)]
fn request_stop(name: &str, pid: u32, child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let sent = i32::try_from(pid)
        .map_err(|e| e.to_string())
        .and_then(|raw| kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|e| e.to_string()));
    if let Err(e) = sent {
        warn!(connector = %name, pid, "SIGTERM failed ({e}); killing");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn request_stop(name: &str, pid: u32, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(connector = %name, pid, "Stop request failed: {e}");
    }
}
