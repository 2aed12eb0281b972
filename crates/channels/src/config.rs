//! Per-connector configuration with environment indirection.
//!
//! Structural settings live in the connector list; secrets are referenced
//! as `${ENV_NAME}` placeholders or picked up from a fallback variable.

use std::time::Duration;

use proto::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque key/value settings of one connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorConfig(Map<String, Value>);

impl ConnectorConfig {
    /// Wraps an existing map.
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Adds a value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw map, placeholders unresolved.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Resolves `key`:
    ///
    /// 1. a non-null configured value wins; a `${NAME}` string resolves from
    ///    the environment, falling back to `default` when unset;
    /// 2. otherwise `env_key`, when given, is read from the environment;
    /// 3. otherwise `default`.
    pub fn get_config(
        &self,
        key: &str,
        default: Option<Value>,
        env_key: Option<&str>,
    ) -> Option<Value> {
        match self.0.get(key) {
            Some(Value::Null) | None => {}
            Some(Value::String(raw)) => {
                return match placeholder_name(raw) {
                    Some(name) => std::env::var(name).ok().map(Value::String).or(default),
                    None => Some(Value::String(raw.clone())),
                };
            }
            Some(value) => return Some(value.clone()),
        }

        if let Some(env_key) = env_key
            && let Ok(value) = std::env::var(env_key)
        {
            return Some(Value::String(value));
        }
        default
    }

    /// Resolves `key` as text. Scalars are rendered, containers are ignored.
    pub fn get_str(&self, key: &str, env_key: Option<&str>) -> Option<String> {
        match self.get_config(key, None, env_key)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Resolves `key` as text with a fallback.
    pub fn get_string_or(&self, key: &str, default: &str, env_key: Option<&str>) -> String {
        self.get_str(key, env_key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Resolves a required, non-empty text value.
    pub fn require_str(&self, key: &str, env_key: Option<&str>) -> Result<String, ConfigError> {
        match self.get_str(key, env_key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingField(key.to_string())),
        }
    }

    /// Resolves a floating point number; numeric strings are accepted.
    pub fn get_f64(&self, key: &str, env_key: Option<&str>) -> Result<Option<f64>, ConfigError> {
        match self.get_config(key, None, env_key) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(key, &s)),
            Some(other) => Err(invalid(key, &other.to_string())),
        }
    }

    /// Resolves a port number.
    pub fn get_port(&self, key: &str, default: u16, env_key: Option<&str>) -> Result<u16, ConfigError> {
        match self.get_config(key, None, env_key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| invalid(key, &n.to_string())),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid(key, &s)),
            Some(other) => Err(invalid(key, &other.to_string())),
        }
    }

    /// Resolves a positive duration given in (fractional) seconds.
    pub fn get_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get_f64(key, None)? {
            None => Ok(default),
            Some(secs) if secs > 0.0 => {
                Duration::try_from_secs_f64(secs).map_err(|_| invalid(key, &secs.to_string()))
            }
            Some(secs) => Err(invalid(key, &secs.to_string())),
        }
    }
}

impl From<Map<String, Value>> for ConnectorConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self(values)
    }
}

/// Returns `NAME` for a `${NAME}` placeholder.
fn placeholder_name(raw: &str) -> Option<&str> {
    raw.strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: key.to_string(),
        reason: format!("unusable value {value:?}"),
    }
}
