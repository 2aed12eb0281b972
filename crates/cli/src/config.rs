//! `seedlink.toml` loading, environment overrides and validation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use channels::{ConnectorKind, ConnectorRegistry};
use proto::ConfigError;
use queue::QueueLayout;
use serde::{Deserialize, Serialize};
use supervisor::{ConnectorRegistration, DEFAULT_SHUTDOWN_TIMEOUT, RestartPolicy};
use tracing::debug;

const CONFIG_FILE_NAME: &str = "seedlink.toml";
const PID_FILE_NAME: &str = "seedlink.pid";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of `messages/` and `logs/`.
    pub home: PathBuf,
    pub supervisor: SupervisorConfig,
    /// Declarative connector list, in start order.
    pub connectors: Vec<ConnectorRegistration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            supervisor: SupervisorConfig::default(),
            connectors: Vec::new(),
        }
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart_on_crash: bool,
    pub restart_delay_secs: f64,
    pub shutdown_timeout_secs: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let policy = RestartPolicy::default();
        Self {
            restart_on_crash: policy.restart_on_crash,
            restart_delay_secs: policy.restart_delay.as_secs_f64(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT.as_secs_f64(),
        }
    }
}

impl SupervisorConfig {
    /// Values [`Config::validate`] would reject fall back to the defaults.
    pub fn restart_policy(&self) -> RestartPolicy {
        let default = RestartPolicy::default();
        RestartPolicy {
            restart_on_crash: self.restart_on_crash,
            restart_delay: to_duration("", self.restart_delay_secs, true)
                .unwrap_or(default.restart_delay),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        to_duration("", self.shutdown_timeout_secs, false).unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(Path::to_path_buf).or_else(|| {
            let cwd = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
            if cwd.exists() {
                return Some(cwd);
            }
            let home_config = default_home().join(CONFIG_FILE_NAME);
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = match config_path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(&path)?)?,
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(home) = std::env::var("SEEDLINK_HOME")
            && !home.trim().is_empty()
        {
            self.home = PathBuf::from(home);
        }
        if let Some(secs) = env_secs("SEEDLINK_RESTART_DELAY_SECS")? {
            self.supervisor.restart_delay_secs = secs;
        }
        if let Some(secs) = env_secs("SEEDLINK_SHUTDOWN_TIMEOUT_SECS")? {
            self.supervisor.shutdown_timeout_secs = secs;
        }
        Ok(())
    }

    /// Rejects unusable durations, bad or duplicate connector names and
    /// connector types `registry` cannot build.
    pub fn validate(&self, registry: &ConnectorRegistry) -> Result<(), ConfigError> {
        check_secs("supervisor.restart_delay_secs", self.supervisor.restart_delay_secs, true)?;
        check_secs(
            "supervisor.shutdown_timeout_secs",
            self.supervisor.shutdown_timeout_secs,
            false,
        )?;

        let mut seen = HashSet::new();
        for entry in &self.connectors {
            queue::validate_name(&entry.name).map_err(|e| ConfigError::InvalidValue {
                field: "connectors.name".to_string(),
                reason: e.to_string(),
            })?;
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "connectors.name".to_string(),
                    reason: format!("duplicate connector name '{}'", entry.name),
                });
            }
            let kind: ConnectorKind = entry.kind.parse()?;
            if !registry.contains(&kind) {
                return Err(ConfigError::UnknownConnectorType(entry.kind.clone()));
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> QueueLayout {
        QueueLayout::new(&self.home)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.home.join(PID_FILE_NAME)
    }
}

/// `~/.seedlink`, or `./.seedlink` when `HOME` is unset.
pub fn default_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".seedlink")
}

fn env_secs(var: &str) -> Result<Option<f64>, ConfigError> {
    let raw = match std::env::var(var) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };
    let secs: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: var.to_string(),
        reason: format!("'{raw}' is not a number of seconds"),
    })?;
    to_duration(var, secs, true)?;
    Ok(Some(secs))
}

fn check_secs(field: &str, secs: f64, allow_zero: bool) -> Result<(), ConfigError> {
    to_duration(field, secs, allow_zero).map(|_| ())
}

/// Converts seconds to a `Duration`, rejecting negative, non-finite and
/// out-of-range values instead of panicking.
fn to_duration(field: &str, secs: f64, allow_zero: bool) -> Result<Duration, ConfigError> {
    let unusable = || ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{secs} is not a usable number of seconds"),
    };
    if secs == 0.0 && !allow_zero {
        return Err(unusable());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| unusable())
}
