//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::Signal;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WardenConfig {
    /// Primary HTTP server (bind address, connection limit).
    pub server: ServerConfig,

    /// Termination sequence settings.
    pub shutdown: ShutdownConfig,

    /// Dependencies gating readiness.
    pub dependencies: DependenciesConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Primary HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Termination sequence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Signals that trigger shutdown.
    pub signals: Vec<Signal>,

    /// Pause before terminating anything, so upstream routing can catch up.
    /// Zero disables the pause.
    pub delay_ms: u64,

    /// Bound on the whole parallel dependency shutdown.
    pub dependency_timeout_ms: u64,

    /// How long the primary component may drain in-flight work.
    pub graceful_timeout_ms: u64,
}

impl ShutdownConfig {
    pub fn delay(&self) -> Option<Duration> {
        (self.delay_ms > 0).then(|| Duration::from_millis(self.delay_ms))
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            signals: vec![Signal::Terminate],
            delay_ms: 0,
            dependency_timeout_ms: 5_000,
            graceful_timeout_ms: 30_000,
        }
    }
}

/// Named dependencies registered at startup.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DependenciesConfig {
    pub names: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output (development).
    Pretty,
    /// Single-line output (production).
    #[default]
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Expose Prometheus metrics.
    pub metrics_enabled: bool,

    /// Prometheus listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.shutdown.signals, vec![Signal::Terminate]);
        assert_eq!(config.shutdown.delay(), None);
        assert_eq!(config.shutdown.dependency_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown.graceful_timeout(), Duration::from_secs(30));
        assert!(config.dependencies.names.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config: WardenConfig = toml::from_str(
            r#"
            [shutdown]
            signals = ["SIGTERM", "sigint"]
            delay_ms = 250

            [dependencies]
            names = ["db", "cache"]

            [observability]
            log_format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.shutdown.signals, vec![Signal::Terminate, Signal::Interrupt]);
        assert_eq!(config.shutdown.delay(), Some(Duration::from_millis(250)));
        assert_eq!(config.shutdown.dependency_timeout_ms, 5_000);
        assert_eq!(config.dependencies.names, vec!["db", "cache"]);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert_eq!(config.server.max_connections, 10_000);
    }

    #[test]
    fn test_unknown_signal_rejected() {
        let result = toml::from_str::<WardenConfig>("[shutdown]\nsignals = [\"SIGNOPE\"]\n");
        assert!(result.is_err());
    }
}
