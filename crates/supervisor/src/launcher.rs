//! How a registration becomes an OS process.

use std::path::PathBuf;
use std::process::Stdio;

use proto::SupervisorError;
use tokio::process::Command;

use crate::registration::ConnectorRegistration;

/// Builds the command for one worker process.
pub trait WorkerLauncher: Send + Sync {
    fn command(&self, registration: &ConnectorRegistration) -> Result<Command, SupervisorError>;
}

/// Re-executes a `seedlink` binary with the `worker` subcommand.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    home: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            home: home.into(),
            extra_args: Vec::new(),
        }
    }

    /// Launcher for the currently running executable.
    pub fn current_exe(home: impl Into<PathBuf>) -> Result<Self, SupervisorError> {
        let program = std::env::current_exe().map_err(|source| SupervisorError::Spawn {
            name: "<supervisor>".to_string(),
            source,
        })?;
        Ok(Self::new(program, home))
    }

    /// Arguments placed before the `worker` subcommand (e.g. `--log-level`).
    pub fn with_global_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.extra_args.extend(args);
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn command(&self, registration: &ConnectorRegistration) -> Result<Command, SupervisorError> {
        let config = serde_json::to_string(&registration.config).map_err(|e| {
            SupervisorError::Spawn {
                name: registration.name.clone(),
                source: std::io::Error::other(e),
            }
        })?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("worker")
            .arg("--name")
            .arg(&registration.name)
            .arg("--type")
            .arg(&registration.kind)
            .arg("--home")
            .arg(&self.home)
            .arg("--config")
            .arg(config)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Ok(cmd)
    }
}
