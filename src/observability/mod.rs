//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: dependency, signal, phase)
//!     → metrics.rs (gauges for health, counters for shutdown outcomes)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
