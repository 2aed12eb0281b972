//! Declarative connector entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of the connector list: `name` and `type` are reserved, every
/// other key is handed to the connector as its config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRegistration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl ConnectorRegistration {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config: Map::new(),
        }
    }

    /// Adds a config value, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}
