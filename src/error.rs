//! Error types for the lifecycle subsystems.
//!
//! Setup-time errors (`LifecycleError`) are returned to the caller and are
//! expected to halt initialization. Shutdown-time errors (`ShutdownError`)
//! never propagate out of the termination sequence; they are logged and, for
//! the two timeout backstops, end the process.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::Signal;

/// Error produced by caller-supplied shutdown actions and primary components.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while wiring up the lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The dependency set was created more than once.
    #[error("dependencies have already been created")]
    DuplicateInitialization,

    /// The same name appeared twice in a single `create` call.
    #[error("dependency '{0}' is listed more than once")]
    DuplicateDependency(String),

    /// Lookup of a dependency that was never registered.
    #[error("dependency '{0}' was never registered")]
    NotFound(String),

    /// A signal name that does not map to a known signal.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// The signal cannot be observed on this platform.
    #[error("signal {0} is not supported on this platform")]
    UnsupportedSignal(Signal),

    /// Registering the OS signal handler failed.
    #[error("failed to install {signal} handler: {source}")]
    SignalInstall {
        signal: Signal,
        source: std::io::Error,
    },
}

/// Failures observed while the termination sequence runs.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The primary component (or plain shutdown callback) failed.
    #[error("primary component shutdown failed: {0}")]
    PrimaryComponent(BoxError),

    /// A single dependency's shutdown action failed.
    #[error("dependency '{name}' failed to shut down: {source}")]
    Dependency { name: String, source: BoxError },

    /// A dependency's shutdown task panicked.
    #[error("dependency '{name}' panicked during shutdown")]
    DependencyPanicked { name: String },

    /// The parallel dependency batch did not settle in time.
    #[error("dependencies did not shut down within {0:?}")]
    DependencyTimeout(Duration),

    /// The process was still running after the sequence completed.
    #[error("process did not exit within {0:?} of shutdown completing")]
    ExitWatchdogTriggered(Duration),
}
