//! Health readiness and graceful shutdown for long-running services.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::WardenConfig;
pub use error::{BoxError, LifecycleError, ShutdownError};
pub use health::{Dependency, ReadinessTracker};
pub use http::HttpServer;
pub use lifecycle::{Lifecycle, PrimaryComponent, ShutdownOptions, ShutdownOutcome, ShutdownReason, Signal};
