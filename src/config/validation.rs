//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate dependency names and signals
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: WardenConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::WardenConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &WardenConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be greater than 0"));
    }

    let shutdown = &config.shutdown;
    if shutdown.signals.is_empty() {
        errors.push(ValidationError::new("shutdown.signals", "at least one signal is required"));
    }
    let mut seen = HashSet::new();
    for signal in &shutdown.signals {
        if !seen.insert(signal) {
            errors.push(ValidationError::new(
                "shutdown.signals",
                format!("{} is listed more than once", signal),
            ));
        }
    }
    if shutdown.dependency_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.dependency_timeout_ms",
            "must be greater than 0",
        ));
    }
    if shutdown.graceful_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.graceful_timeout_ms",
            "must be greater than 0",
        ));
    }

    let mut names = HashSet::new();
    for name in &config.dependencies.names {
        if name.trim().is_empty() {
            errors.push(ValidationError::new("dependencies.names", "names must not be empty"));
        } else if !names.insert(name.as_str()) {
            errors.push(ValidationError::new(
                "dependencies.names",
                format!("'{}' is listed more than once", name),
            ));
        }
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
