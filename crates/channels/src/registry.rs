//! Connector kinds and the constructor table used by workers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use proto::ConfigError;

use crate::adapter::Connector;
use crate::cli::CliConnector;
use crate::config::ConnectorConfig;
use crate::webhook::WebhookConnector;

/// Adapter kind named by a connector's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectorKind {
    Cli,
    Webhook,
    /// Kind added at runtime through [`ConnectorRegistry::register_custom`].
    Custom(String),
}

impl ConnectorKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cli => "cli",
            Self::Webhook => "webhook",
            Self::Custom(tag) => tag,
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ConfigError::InvalidValue {
                field: "type".to_string(),
                reason: "connector type must not be empty".to_string(),
            }),
            "cli" => Ok(Self::Cli),
            "webhook" => Ok(Self::Webhook),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named connector instance: `name` is unique per deployment and is the
/// outbox routing key.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSpec {
    pub name: String,
    pub kind: ConnectorKind,
    pub config: ConnectorConfig,
}

impl ConnectorSpec {
    pub fn new(name: impl Into<String>, kind: ConnectorKind, config: ConnectorConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
        }
    }
}

/// Builds a connector from its spec.
pub type ConnectorFactory = fn(&ConnectorSpec) -> Result<Box<dyn Connector>, ConfigError>;

/// Type tag to constructor table.
#[derive(Clone)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Registry holding the built-in `cli` and `webhook` kinds.
    pub fn with_builtins() -> Self {
        let mut factories: BTreeMap<String, ConnectorFactory> = BTreeMap::new();
        factories.insert(ConnectorKind::Cli.to_string(), build_cli);
        factories.insert(ConnectorKind::Webhook.to_string(), build_webhook);
        Self { factories }
    }

    /// Adds a new kind. Existing tags cannot be replaced.
    pub fn register_custom(
        &mut self,
        type_tag: &str,
        factory: ConnectorFactory,
    ) -> Result<(), ConfigError> {
        let tag = type_tag.trim();
        if tag.is_empty() || self.factories.contains_key(tag) {
            return Err(ConfigError::InvalidValue {
                field: "type".to_string(),
                reason: format!("connector type '{tag}' is empty or already registered"),
            });
        }
        self.factories.insert(tag.to_string(), factory);
        Ok(())
    }

    pub fn contains(&self, kind: &ConnectorKind) -> bool {
        self.factories.contains_key(kind.as_str())
    }

    /// Registered type tags, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn build(&self, spec: &ConnectorSpec) -> Result<Box<dyn Connector>, ConfigError> {
        let factory = self
            .factories
            .get(spec.kind.as_str())
            .ok_or_else(|| ConfigError::UnknownConnectorType(spec.kind.to_string()))?;
        factory(spec)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn build_cli(spec: &ConnectorSpec) -> Result<Box<dyn Connector>, ConfigError> {
    Ok(Box::new(CliConnector::from_spec(spec)?))
}

fn build_webhook(spec: &ConnectorSpec) -> Result<Box<dyn Connector>, ConfigError> {
    Ok(Box::new(WebhookConnector::from_spec(spec)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_builtins_and_custom_tags() {
        assert_eq!("cli".parse::<ConnectorKind>().expect("cli"), ConnectorKind::Cli);
        assert_eq!(
            "webhook".parse::<ConnectorKind>().expect("webhook"),
            ConnectorKind::Webhook
        );
        assert_eq!(
            "slack".parse::<ConnectorKind>().expect("custom"),
            ConnectorKind::Custom("slack".into())
        );
        assert!("  ".parse::<ConnectorKind>().is_err());
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ConnectorRegistry::with_builtins();
        assert_eq!(registry.type_names(), vec!["cli", "webhook"]);
        assert!(registry.contains(&ConnectorKind::Cli));
        assert!(!registry.contains(&ConnectorKind::Custom("slack".into())));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = ConnectorRegistry::with_builtins();
        let spec = ConnectorSpec::new(
            "slack-main",
            ConnectorKind::Custom("slack".into()),
            ConnectorConfig::default(),
        );
        let err = registry.build(&spec).err().expect("unknown type");
        assert!(matches!(err, ConfigError::UnknownConnectorType(tag) if tag == "slack"));
    }

    #[test]
    fn custom_kinds_can_be_added_once() {
        let mut registry = ConnectorRegistry::with_builtins();
        registry.register_custom("echo", build_cli).expect("register");
        assert!(registry.register_custom("echo", build_cli).is_err());
        assert!(registry.register_custom("cli", build_cli).is_err());

        let spec = ConnectorSpec::new(
            "echo-1",
            ConnectorKind::Custom("echo".into()),
            ConnectorConfig::default(),
        );
        let connector = registry.build(&spec).expect("build");
        assert_eq!(connector.connector_type(), "cli");
    }
}
