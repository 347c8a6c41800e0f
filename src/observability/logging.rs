//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once, from the entry point
//! - Pick the output format and level from config
//!
//! # Design Decisions
//! - Library code only emits `tracing` events; with no subscriber installed
//!   they are dropped, so embedding the crate is silent by default
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Build the level filter: `RUST_LOG` if set, otherwise the configured level.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("warden={0},tower_http={0}", config.log_level).into())
}

/// Install the global subscriber.
///
/// Returns false if a subscriber was already installed.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(tracing_subscriber::fmt::layer().compact()).try_init(),
    };

    result.is_ok()
}
