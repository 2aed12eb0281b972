//! Connector contract, lifecycle runtime and built-in connectors.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod registry;
pub mod runtime;
pub mod webhook;

#[cfg(test)]
mod test_support;

/// Trait implemented by every connector.
pub use adapter::Connector;
/// Local terminal connector.
pub use cli::CliConnector;
/// Per-connector settings with environment indirection.
pub use config::ConnectorConfig;
/// Connector kinds and constructors.
pub use registry::{ConnectorFactory, ConnectorKind, ConnectorRegistry, ConnectorSpec};
/// Lifecycle runtime.
pub use runtime::{
    ConnectorContext, ConnectorRuntime, ConnectorState, DEFAULT_OUTBOX_POLL_INTERVAL,
    DeliveryReport, deliver_outbox,
};
/// Generic HTTP webhook connector.
pub use webhook::{WebhookConnector, WebhookSettings};
