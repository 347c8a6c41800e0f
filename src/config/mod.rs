//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → WardenConfig (validated, immutable)
//!     → shutdown section handed to the lifecycle before signals are attached
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    DependenciesConfig, LogFormat, ObservabilityConfig, ServerConfig, ShutdownConfig, WardenConfig,
};
pub use validation::{validate_config, ValidationError};
