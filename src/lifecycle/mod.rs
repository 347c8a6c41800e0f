//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Setup (process.rs):
//!     Lifecycle::new → create dependencies → configure shutdown
//!     → listen_for_signals
//!
//! Shutdown (shutdown.rs):
//!     Signal received / shutdown() called
//!     → optional delay
//!     → primary.rs (drain the serving component)
//!     → dependency shutdown actions, in parallel, one timeout
//!     → timers.rs (purge every non-exempt timer)
//!     → exit.rs (watchdog forces exit if the process lingers)
//!
//! Signals (signals.rs):
//!     Configured signal set → one handler each → shutdown trigger
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: primary first, dependencies second, timers last
//! - Two backstops: a dependency timeout and an exit watchdog, both exiting
//!   with code 1
//! - Process exit is injected so forced exits are testable

pub mod exit;
pub mod primary;
pub mod process;
pub mod shutdown;
pub mod signals;
pub mod timers;

pub use exit::{ProcessExit, StdExit, EXIT_WATCHDOG, FORCED_EXIT_CODE};
pub use primary::{FnPrimary, PrimaryComponent};
pub use process::Lifecycle;
pub use shutdown::{
    DependencyOutcome, DependencyReport, PrimaryOutcome, ShutdownCoordinator, ShutdownOptions,
    ShutdownOutcome, ShutdownPhase, ShutdownReason, ShutdownReport,
};
pub use signals::Signal;
pub use timers::{TimerCounts, TimerId, TimerKind, TimerLedger};
