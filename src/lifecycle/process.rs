//! Process lifecycle root.
//!
//! # Responsibilities
//! - Own the readiness tracker, dependency registry, timer ledger and
//!   shutdown coordinator for one process
//! - Wire configured signals to the shutdown sequence
//!
//! # Design Decisions
//! - One `Arc<Lifecycle>` is created at startup and handed to whoever needs
//!   it; there is no global instance
//! - The dependency set is written once during setup and only read after
//!   that, so probes never contend with writers

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::LifecycleError;
use crate::health::{Dependency, DependencyRegistry, ReadinessTracker};
use crate::lifecycle::exit::{ProcessExit, StdExit};
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownOptions, ShutdownOutcome, ShutdownReason};
use crate::lifecycle::signals::{self, Signal};
use crate::lifecycle::timers::TimerLedger;

/// Health and shutdown state for the whole process.
#[derive(Debug)]
pub struct Lifecycle {
    readiness: Arc<ReadinessTracker>,
    registry: Arc<DependencyRegistry>,
    timers: Arc<TimerLedger>,
    coordinator: ShutdownCoordinator,
}

impl Lifecycle {
    /// Create a lifecycle whose forced exits end the process.
    pub fn new() -> Arc<Self> {
        Self::with_exit(Arc::new(StdExit))
    }

    /// Create a lifecycle with a custom exit hook.
    pub fn with_exit(exit: Arc<dyn ProcessExit>) -> Arc<Self> {
        let readiness = Arc::new(ReadinessTracker::new());
        let registry = Arc::new(DependencyRegistry::new(Arc::clone(&readiness)));
        let timers = Arc::new(TimerLedger::new());
        let coordinator = ShutdownCoordinator::new(Arc::clone(&registry), Arc::clone(&timers), exit);

        Arc::new(Self {
            readiness,
            registry,
            timers,
            coordinator,
        })
    }

    /// Create the dependency set. Allowed once per process.
    pub fn create_dependencies<I, S>(&self, names: I) -> Result<Vec<Arc<Dependency>>, LifecycleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.create(names)
    }

    pub fn dependency(&self, name: &str) -> Result<Arc<Dependency>, LifecycleError> {
        self.registry.get(name)
    }

    /// Dependencies in creation order. Empty before `create_dependencies`.
    pub fn dependencies(&self) -> &[Arc<Dependency>] {
        self.registry.dependencies()
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn is_alive(&self) -> bool {
        self.readiness.is_alive()
    }

    pub fn set_alive(&self) {
        self.readiness.set_alive();
    }

    pub fn set_dead(&self) {
        self.readiness.set_dead();
    }

    /// Register the callback fired once every dependency is ready.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.readiness.on_ready(callback);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.coordinator.is_shutting_down()
    }

    /// Timers that the shutdown sequence purges.
    pub fn timers(&self) -> &TimerLedger {
        &self.timers
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn configure_shutdown(&self, options: ShutdownOptions) {
        self.coordinator.configure(options);
    }

    /// Install handlers for every configured shutdown signal.
    ///
    /// Each delivery starts the shutdown sequence; deliveries after the first
    /// are logged and ignored. Must be called from within a Tokio runtime,
    /// after `configure_shutdown`.
    pub fn listen_for_signals(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, LifecycleError> {
        let options = self.coordinator.options();
        let mut seen = HashSet::new();
        let signals: Vec<Signal> = options
            .config
            .signals
            .iter()
            .copied()
            .filter(|signal| seen.insert(*signal))
            .collect();

        let mut handles = Vec::with_capacity(signals.len());
        for signal in signals {
            let lifecycle = Arc::clone(self);
            let handle = signals::listen(signal, move |signal| {
                let lifecycle = Arc::clone(&lifecycle);
                tokio::spawn(async move {
                    lifecycle.shutdown(ShutdownReason::Signal(signal)).await;
                });
            });

            match handle {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in &handles {
                        handle.abort();
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(signals = ?options.config.signals, "Listening for shutdown signals");
        Ok(handles)
    }

    /// Run the shutdown sequence. Only the first trigger does any work.
    pub async fn shutdown(&self, reason: ShutdownReason) -> ShutdownOutcome {
        self.coordinator.shutdown(reason).await
    }

    /// Wait until the shutdown sequence has finished.
    pub async fn wait(&self) {
        self.coordinator.wait().await;
    }
}
