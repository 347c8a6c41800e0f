//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::WardenConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<WardenConfig, ConfigError> {
    let config: WardenConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WardenConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("warden-{}-{}.toml", name, std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_from_disk() {
        let path = temp_file(
            "load",
            r#"
            [server]
            bind_address = "127.0.0.1:3000"

            [shutdown]
            dependency_timeout_ms = 100
            "#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.shutdown.dependency_timeout_ms, 100);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/warden.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse_config(
            r#"
            [shutdown]
            dependency_timeout_ms = 0

            [dependencies]
            names = ["db", "db"]
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse_config("[shutdown"), Err(ConfigError::Parse(_))));
    }
}
