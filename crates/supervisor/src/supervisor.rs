//! Process-per-connector supervisor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use proto::{Shutdown, SupervisorError};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::launcher::WorkerLauncher;
use crate::registration::ConnectorRegistration;
use crate::worker::{RestartPolicy, WorkerSlot, WorkerTable, WorkerTask};

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time view of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub pid: Option<u32>,
    pub alive: bool,
    pub restarts: u32,
}

struct Running {
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the worker registry and one supervision task per worker.
pub struct Supervisor {
    registrations: Vec<ConnectorRegistration>,
    launcher: Arc<dyn WorkerLauncher>,
    shutdown_timeout: Duration,
    table: WorkerTable,
    running: Option<Running>,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            registrations: Vec::new(),
            launcher,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            table: Arc::new(DashMap::new()),
            running: None,
        }
    }

    /// Builds a supervisor from the declarative connector list, in order.
    pub fn from_config(
        launcher: Arc<dyn WorkerLauncher>,
        registrations: impl IntoIterator<Item = ConnectorRegistration>,
    ) -> Result<Self, SupervisorError> {
        let mut supervisor = Self::new(launcher);
        for reg in registrations {
            supervisor.register(reg.name, reg.kind, reg.config)?;
        }
        Ok(supervisor)
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn registrations(&self) -> &[ConnectorRegistration] {
        &self.registrations
    }

    /// Adds a connector. Names are unique; registration closes at `start`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: Map<String, Value>,
    ) -> Result<(), SupervisorError> {
        if self.running.is_some() {
            return Err(SupervisorError::AlreadyStarted);
        }
        let name = name.into();
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(SupervisorError::DuplicateName(name));
        }
        let kind = kind.into();
        info!(connector = %name, kind = %kind, "Registered connector");
        self.table.insert(name.clone(), WorkerSlot::new(&kind));
        self.registrations.push(ConnectorRegistration { name, kind, config });
        Ok(())
    }

    /// Spawns every registered worker and keeps each one alive per `policy`.
    pub fn start(&mut self, policy: RestartPolicy) -> Result<(), SupervisorError> {
        if self.running.is_some() {
            return Err(SupervisorError::AlreadyStarted);
        }
        info!(
            workers = self.registrations.len(),
            restart_on_crash = policy.restart_on_crash,
            "Starting supervisor"
        );

        let shutdown = Shutdown::new();
        let tasks = self
            .registrations
            .iter()
            .map(|registration| {
                let task = WorkerTask {
                    registration: registration.clone(),
                    launcher: self.launcher.clone(),
                    table: self.table.clone(),
                    policy,
                    shutdown_timeout: self.shutdown_timeout,
                };
                tokio::spawn(task.supervise(shutdown.signal()))
            })
            .collect();

        self.running = Some(Running { shutdown, tasks });
        Ok(())
    }

    /// Stops every worker: SIGTERM, wait up to the shutdown timeout, kill.
    /// Returns once all workers are accounted for. No-op when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        info!("Stopping all connectors");
        running.shutdown.trigger();

        for result in join_all(running.tasks).await {
            if let Err(e) = result {
                warn!("Supervision task failed: {e}");
            }
        }
        for mut slot in self.table.iter_mut() {
            slot.pid = None;
            slot.alive = false;
        }
        info!("All connectors stopped");
    }

    /// Snapshot of every registration, in registration order.
    pub fn status(&self) -> Vec<WorkerStatus> {
        self.registrations
            .iter()
            .map(|reg| {
                let slot = self
                    .table
                    .get(&reg.name)
                    .map(|slot| slot.clone())
                    .unwrap_or_else(|| WorkerSlot::new(&reg.kind));
                WorkerStatus {
                    name: reg.name.clone(),
                    kind: slot.kind,
                    pid: slot.pid,
                    alive: slot.alive,
                    restarts: slot.restarts,
                }
            })
            .collect()
    }

    /// Starts, logs status periodically until `until` resolves, then stops.
    pub async fn run<F>(&mut self, policy: RestartPolicy, until: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = ()>,
    {
        self.start(policy)?;
        tokio::pin!(until);

        let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = &mut until => break,
                _ = ticker.tick() => self.log_status(),
            }
        }

        self.stop().await;
        Ok(())
    }

    fn log_status(&self) {
        for status in self.status() {
            info!(
                connector = %status.name,
                kind = %status.kind,
                pid = ?status.pid,
                alive = status.alive,
                restarts = status.restarts,
                "Worker status"
            );
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Tasks observe the trigger and stop their workers in the background.
        if let Some(running) = &self.running {
            running.shutdown.trigger();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::process::Command;

    use super::*;

    struct NeverLauncher;

    impl WorkerLauncher for NeverLauncher {
        fn command(&self, _reg: &ConnectorRegistration) -> Result<Command, SupervisorError> {
            Ok(Command::new("/nonexistent/seedlink-worker"))
        }
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(Arc::new(NeverLauncher))
    }

    #[test]
    fn empty_supervisor_has_empty_status() {
        assert!(supervisor().status().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut sup = supervisor();
        sup.register("cli", "cli", Map::new()).expect("first");
        let err = sup.register("cli", "webhook", Map::new()).expect_err("dup");
        assert!(matches!(err, SupervisorError::DuplicateName(name) if name == "cli"));
        assert_eq!(sup.registrations().len(), 1);
    }

    #[test]
    fn status_before_start_lists_registrations_in_order() {
        let regs = vec![
            ConnectorRegistration::new("b-hook", "webhook"),
            ConnectorRegistration::new("a-cli", "cli"),
        ];
        let sup = Supervisor::from_config(Arc::new(NeverLauncher), regs).expect("from config");
        let status = sup.status();
        assert_eq!(
            status,
            vec![
                WorkerStatus {
                    name: "b-hook".into(),
                    kind: "webhook".into(),
                    pid: None,
                    alive: false,
                    restarts: 0,
                },
                WorkerStatus {
                    name: "a-cli".into(),
                    kind: "cli".into(),
                    pid: None,
                    alive: false,
                    restarts: 0,
                },
            ]
        );
    }

    #[test]
    fn from_config_rejects_duplicates() {
        let regs = vec![
            ConnectorRegistration::new("x", "cli"),
            ConnectorRegistration::new("x", "cli"),
        ];
        assert!(matches!(
            Supervisor::from_config(Arc::new(NeverLauncher), regs),
            Err(SupervisorError::DuplicateName(_))
        ));
    }

    #[tokio::test]
    async fn spawn_failures_are_not_fatal() {
        let mut sup = supervisor();
        sup.register("ghost", "cli", Map::new()).expect("register");
        sup.start(RestartPolicy {
            restart_on_crash: true,
            restart_delay: Duration::from_millis(20),
        })
        .expect("start");
        assert!(matches!(sup.start(RestartPolicy::default()), Err(SupervisorError::AlreadyStarted)));
        assert!(matches!(
            sup.register("late", "cli", Map::new()),
            Err(SupervisorError::AlreadyStarted)
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sup.status()[0].alive);

        tokio::time::timeout(Duration::from_secs(2), sup.stop())
            .await
            .expect("stop returns promptly");
        assert!(!sup.is_running());
    }

    #[test]
    fn status_serializes_type_key() {
        let status = WorkerStatus {
            name: "cli".into(),
            kind: "cli".into(),
            pid: Some(42),
            alive: true,
            restarts: 1,
        };
        let value = serde_json::to_value(&status).expect("json");
        assert_eq!(value["type"], "cli");
        assert_eq!(value["pid"], 42);
    }
}
