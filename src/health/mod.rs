//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Setup (registry.rs):
//!     Names → create dependency set (once) → Arc<Dependency> handles
//!
//! Runtime (dependency.rs):
//!     dependency.set_ready()
//!     → readiness.rs re-checks aggregate state
//!     → first time all are ready: on-ready callback spawned
//!
//! Probes (readiness.rs):
//!     is_ready() = every dependency ready
//!     is_alive() = explicit flag, else is_ready()
//! ```
//!
//! # Design Decisions
//! - Ready is monotonic per dependency; it never reverts
//! - Liveness falls back to readiness until set explicitly
//! - Probes are plain booleans; wiring them to HTTP is the caller's job

pub mod dependency;
pub mod readiness;
pub mod registry;

pub use dependency::{shutdown_action, Dependency, ShutdownAction};
pub use readiness::{Liveness, ReadinessTracker, ReadyCallback};
pub use registry::DependencyRegistry;
