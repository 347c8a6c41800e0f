//! Shutdown coordination.
//!
//! # Phases
//! ```text
//! Running
//!   → Delaying                  (only with a configured delay)
//!   → TerminatingPrimary        (adapter, else plain callback, else no-op)
//!   → TerminatingDependencies   (all in parallel, one timeout for the batch)
//!   → ClearingTimers            (purge the timer ledger)
//!   → Exited                    (watchdog armed; process is expected to end)
//! ```
//!
//! # Design Decisions
//! - The shutting-down flag is a single compare-exchange; only the winner runs
//!   the sequence, every other trigger just logs
//! - Every step isolates its own failure; only the dependency timeout and the
//!   exit watchdog end the process
//! - The primary drains before dependencies because in-flight requests may
//!   still need them
//! - Configuration is snapshotted when the sequence starts

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use tokio::sync::watch;

use crate::config::ShutdownConfig;
use crate::error::{BoxError, ShutdownError};
use crate::health::{shutdown_action, DependencyRegistry, ShutdownAction};
use crate::lifecycle::exit::{self, ProcessExit, EXIT_WATCHDOG, FORCED_EXIT_CODE};
use crate::lifecycle::primary::PrimaryComponent;
use crate::lifecycle::signals::Signal;
use crate::lifecycle::timers::TimerLedger;
use crate::observability::metrics;

/// Where the termination sequence currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Delaying,
    TerminatingPrimary,
    TerminatingDependencies,
    ClearingTimers,
    Exited,
}

/// What started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(Signal),
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "{}", signal),
            ShutdownReason::Requested => f.write_str("requested"),
        }
    }
}

/// Shutdown configuration plus the non-serializable hooks.
#[derive(Clone, Default)]
pub struct ShutdownOptions {
    pub config: ShutdownConfig,
    primary: Option<Arc<dyn PrimaryComponent>>,
    callback: Option<ShutdownAction>,
}

impl ShutdownOptions {
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            primary: None,
            callback: None,
        }
    }

    /// Terminate `primary` before the dependencies. Takes precedence over a callback.
    pub fn with_primary(mut self, primary: Arc<dyn PrimaryComponent>) -> Self {
        self.primary = Some(primary);
        self
    }

    /// Plain shutdown callback, used when there is no primary component.
    pub fn with_callback<F, Fut, E>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.callback = Some(shutdown_action(callback));
        self
    }

    pub fn primary(&self) -> Option<&Arc<dyn PrimaryComponent>> {
        self.primary.as_ref()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for ShutdownOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownOptions")
            .field("config", &self.config)
            .field("primary", &self.primary.as_ref().map(|p| p.name().to_string()))
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryOutcome {
    /// Nothing was configured.
    Skipped,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyOutcome {
    Completed,
    Failed(String),
    Panicked,
}

impl DependencyOutcome {
    fn label(&self) -> &'static str {
        match self {
            DependencyOutcome::Completed => "completed",
            DependencyOutcome::Failed(_) => "failed",
            DependencyOutcome::Panicked => "panicked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyReport {
    pub name: String,
    pub outcome: DependencyOutcome,
}

/// Summary of a sequence that reached the end without a forced exit.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub primary: PrimaryOutcome,
    pub dependencies: Vec<DependencyReport>,
    pub timers_cleared: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum ShutdownOutcome {
    /// The sequence ran to completion; the process should now exit on its own.
    Completed(ShutdownReport),
    /// A timeout backstop fired and the process was told to exit.
    ForcedExit(ShutdownError),
    /// Another trigger already started the sequence.
    AlreadyInProgress,
}

/// Runs the termination sequence exactly once.
pub struct ShutdownCoordinator {
    options: ArcSwap<ShutdownOptions>,
    configured: AtomicBool,
    shutting_down: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    registry: Arc<DependencyRegistry>,
    timers: Arc<TimerLedger>,
    exit: Arc<dyn ProcessExit>,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<DependencyRegistry>,
        timers: Arc<TimerLedger>,
        exit: Arc<dyn ProcessExit>,
    ) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self {
            options: ArcSwap::from_pointee(ShutdownOptions::default()),
            configured: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            phase,
            registry,
            timers,
            exit,
        }
    }

    /// Install the shutdown configuration.
    ///
    /// Ignored once shutdown has begun; the running sequence keeps its snapshot.
    pub fn configure(&self, options: ShutdownOptions) {
        if self.is_shutting_down() {
            tracing::warn!("Shutdown already in progress, ignoring new configuration");
            return;
        }
        if options.primary.is_some() && options.callback.is_some() {
            tracing::debug!("Primary component configured, plain shutdown callback will not run");
        }
        if self.configured.swap(true, Ordering::SeqCst) {
            tracing::warn!("Replacing existing shutdown configuration");
        }

        tracing::info!(
            signals = ?options.config.signals,
            delay_ms = options.config.delay_ms,
            dependency_timeout_ms = options.config.dependency_timeout_ms,
            graceful_timeout_ms = options.config.graceful_timeout_ms,
            "Shutdown configured"
        );
        self.options.store(Arc::new(options));
    }

    /// Current configuration snapshot.
    pub fn options(&self) -> Arc<ShutdownOptions> {
        self.options.load_full()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Wait until the sequence has reached `Exited`.
    pub async fn wait(&self) {
        let mut rx = self.phase.subscribe();
        // The sender lives as long as `self`, so this only fails if we are dropped.
        let _ = rx.wait_for(|phase| *phase == ShutdownPhase::Exited).await;
    }

    fn enter(&self, phase: ShutdownPhase) {
        tracing::debug!(?phase, "Shutdown phase");
        self.phase.send_replace(phase);
    }

    /// Run the termination sequence. Only the first call does any work.
    pub async fn shutdown(&self, reason: ShutdownReason) -> ShutdownOutcome {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!(%reason, "Shutdown already in progress");
            return ShutdownOutcome::AlreadyInProgress;
        }

        let started = Instant::now();
        metrics::record_shutting_down();
        let options = self.options.load_full();
        tracing::info!(%reason, "Shutdown started");

        if let Some(delay) = options.config.delay() {
            self.enter(ShutdownPhase::Delaying);
            tracing::info!(delay = ?delay, "Delaying shutdown");
            tokio::time::sleep(delay).await;
        }

        self.enter(ShutdownPhase::TerminatingPrimary);
        let primary = self.terminate_primary(&options).await;

        self.enter(ShutdownPhase::TerminatingDependencies);
        let dependencies = match self
            .terminate_dependencies(options.config.dependency_timeout())
            .await
        {
            Ok(reports) => reports,
            Err(err) => {
                tracing::warn!(error = %err, "Forcing process exit");
                metrics::record_forced_exit("dependency_timeout");
                self.exit.exit(FORCED_EXIT_CODE);
                self.enter(ShutdownPhase::Exited);
                return ShutdownOutcome::ForcedExit(err);
            }
        };

        self.enter(ShutdownPhase::ClearingTimers);
        let timers_cleared = self.timers.clear_all();

        exit::arm_watchdog(Arc::clone(&self.exit), EXIT_WATCHDOG);

        let elapsed = started.elapsed();
        metrics::record_shutdown_duration(elapsed);
        tracing::info!(elapsed = ?elapsed, "Shutdown complete");
        self.enter(ShutdownPhase::Exited);

        ShutdownOutcome::Completed(ShutdownReport {
            reason,
            primary,
            dependencies,
            timers_cleared,
            elapsed,
        })
    }

    async fn terminate_primary(&self, options: &ShutdownOptions) -> PrimaryOutcome {
        // Spawned so a panic is contained like any other failure.
        let task = if let Some(primary) = options.primary.clone() {
            let graceful = options.config.graceful_timeout();
            tracing::info!(
                component = primary.name(),
                graceful_timeout = ?graceful,
                "Terminating primary component"
            );
            tokio::spawn(async move { primary.terminate(graceful).await })
        } else if let Some(callback) = options.callback.clone() {
            tracing::info!("Running shutdown callback");
            tokio::spawn(async move { callback().await })
        } else {
            tracing::debug!("No primary component configured");
            return PrimaryOutcome::Skipped;
        };

        let result = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(BoxError::from(join_err)),
        };

        match result {
            Ok(()) => {
                tracing::info!("Primary component terminated");
                PrimaryOutcome::Succeeded
            }
            Err(source) => {
                let err = ShutdownError::PrimaryComponent(source);
                tracing::error!(error = %err, "Continuing shutdown");
                PrimaryOutcome::Failed(err.to_string())
            }
        }
    }

    async fn terminate_dependencies(
        &self,
        timeout: Duration,
    ) -> Result<Vec<DependencyReport>, ShutdownError> {
        let dependencies = self.registry.dependencies();
        if dependencies.is_empty() {
            tracing::debug!("No dependencies to shut down");
            return Ok(Vec::new());
        }

        tracing::info!(
            count = dependencies.len(),
            timeout = ?timeout,
            "Shutting down dependencies"
        );

        let pending = dependencies.iter().map(|dependency| {
            let name = dependency.name().to_string();
            let dependency = Arc::clone(dependency);
            let handle = tokio::spawn(async move { dependency.shutdown().await });

            async move {
                let outcome = match handle.await {
                    Ok(Ok(())) => {
                        tracing::info!(dependency = %name, "Dependency shut down");
                        DependencyOutcome::Completed
                    }
                    Ok(Err(source)) => {
                        let err = ShutdownError::Dependency {
                            name: name.clone(),
                            source,
                        };
                        tracing::error!(error = %err, "Dependency shutdown failed");
                        DependencyOutcome::Failed(err.to_string())
                    }
                    Err(_) => {
                        let err = ShutdownError::DependencyPanicked { name: name.clone() };
                        tracing::error!(error = %err, "Dependency shutdown failed");
                        DependencyOutcome::Panicked
                    }
                };
                metrics::record_dependency_shutdown(&name, outcome.label());
                DependencyReport { name, outcome }
            }
        });

        // Dropping the join handles on timeout detaches the tasks; they are not cancelled.
        tokio::time::timeout(timeout, join_all(pending))
            .await
            .map_err(|_| ShutdownError::DependencyTimeout(timeout))
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("options", &self.options.load_full())
            .field("shutting_down", &self.is_shutting_down())
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ReadinessTracker;
    use crate::lifecycle::primary::FnPrimary;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<i32>>);

    impl ProcessExit for Recorder {
        fn exit(&self, code: i32) {
            self.0.lock().unwrap().push(code);
        }
    }

    impl Recorder {
        fn codes(&self) -> Vec<i32> {
            self.0.lock().unwrap().clone()
        }
    }

    fn coordinator(names: &[&str]) -> (ShutdownCoordinator, Arc<DependencyRegistry>, Arc<Recorder>) {
        let registry = Arc::new(DependencyRegistry::new(Arc::new(ReadinessTracker::new())));
        registry.create(names.iter().copied()).unwrap();
        let recorder = Arc::new(Recorder::default());
        let coordinator = ShutdownCoordinator::new(
            registry.clone(),
            Arc::new(TimerLedger::new()),
            recorder.clone(),
        );
        (coordinator, registry, recorder)
    }

    fn config(dependency_timeout_ms: u64) -> ShutdownConfig {
        ShutdownConfig {
            dependency_timeout_ms,
            ..ShutdownConfig::default()
        }
    }

    #[tokio::test]
    async fn test_second_trigger_is_noop() {
        let (coordinator, registry, _) = coordinator(&["db"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        registry.get("db").unwrap().on_shutdown(move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(())
            }
        });
        coordinator.configure(ShutdownOptions::new(config(100)));

        let (first, second) = tokio::join!(
            coordinator.shutdown(ShutdownReason::Signal(Signal::Terminate)),
            coordinator.shutdown(ShutdownReason::Signal(Signal::Interrupt)),
        );

        assert!(matches!(first, ShutdownOutcome::Completed(_)));
        assert!(matches!(second, ShutdownOutcome::AlreadyInProgress));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.phase(), ShutdownPhase::Exited);
    }

    #[tokio::test]
    async fn test_primary_failure_does_not_abort() {
        let (coordinator, _, recorder) = coordinator(&["db"]);
        let primary = FnPrimary::new("api", |_| async {
            Err::<(), _>(std::io::Error::other("listener gone"))
        });
        coordinator.configure(ShutdownOptions::new(config(100)).with_primary(Arc::new(primary)));

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert!(matches!(report.primary, PrimaryOutcome::Failed(ref m) if m.contains("listener gone")));
        assert_eq!(report.dependencies[0].outcome, DependencyOutcome::Completed);
        assert!(recorder.codes().is_empty());
    }

    #[tokio::test]
    async fn test_primary_takes_precedence_over_callback() {
        let (coordinator, _, _) = coordinator(&[]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let primary = FnPrimary::new("api", move |_| {
            o.lock().unwrap().push("primary");
            async { Ok::<_, BoxError>(()) }
        });
        let o = order.clone();
        coordinator.configure(
            ShutdownOptions::new(config(100))
                .with_primary(Arc::new(primary))
                .with_callback(move || {
                    o.lock().unwrap().push("callback");
                    async { Ok::<_, BoxError>(()) }
                }),
        );

        coordinator.shutdown(ShutdownReason::Requested).await;
        assert_eq!(*order.lock().unwrap(), vec!["primary"]);
    }

    #[tokio::test]
    async fn test_callback_runs_without_primary() {
        let (coordinator, _, _) = coordinator(&[]);
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        coordinator.configure(ShutdownOptions::new(config(100)).with_callback(move || {
            r.store(true, Ordering::SeqCst);
            async { Ok::<_, BoxError>(()) }
        }));

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert_eq!(report.primary, PrimaryOutcome::Succeeded);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_primary_finishes_before_dependencies_start() {
        let (coordinator, registry, _) = coordinator(&["db"]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let primary = FnPrimary::new("api", move |_| {
            let o = o.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                o.lock().unwrap().push("primary");
                Ok::<_, BoxError>(())
            }
        });
        let o = order.clone();
        registry.get("db").unwrap().on_shutdown(move || {
            let o = o.clone();
            async move {
                o.lock().unwrap().push("db");
                Ok::<_, BoxError>(())
            }
        });
        coordinator.configure(ShutdownOptions::new(config(100)).with_primary(Arc::new(primary)));

        coordinator.shutdown(ShutdownReason::Requested).await;
        assert_eq!(*order.lock().unwrap(), vec!["primary", "db"]);
    }

    #[tokio::test]
    async fn test_failing_dependency_does_not_block_siblings() {
        let (coordinator, registry, recorder) = coordinator(&["db", "cache", "queue"]);
        let finished = Arc::new(AtomicUsize::new(0));

        registry
            .get("db")
            .unwrap()
            .on_shutdown(|| async { Err::<(), _>(std::io::Error::other("boom")) });
        for name in ["cache", "queue"] {
            let f = finished.clone();
            registry.get(name).unwrap().on_shutdown(move || {
                let f = f.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                }
            });
        }
        coordinator.configure(ShutdownOptions::new(config(1_000)));

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert_eq!(finished.load(Ordering::SeqCst), 2);
        assert!(matches!(report.dependencies[0].outcome, DependencyOutcome::Failed(_)));
        assert_eq!(report.dependencies[1].outcome, DependencyOutcome::Completed);
        assert_eq!(report.dependencies[2].outcome, DependencyOutcome::Completed);
        assert!(recorder.codes().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_dependency_is_isolated() {
        let (coordinator, registry, _) = coordinator(&["db", "cache"]);
        registry.get("db").unwrap().on_shutdown(|| async {
            if true {
                panic!("driver bug");
            }
            Ok::<_, BoxError>(())
        });
        coordinator.configure(ShutdownOptions::new(config(100)));

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert_eq!(report.dependencies[0].outcome, DependencyOutcome::Panicked);
        assert_eq!(report.dependencies[1].outcome, DependencyOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_dependency_forces_exit() {
        let (coordinator, registry, recorder) = coordinator(&["db", "cache"]);
        registry
            .get("cache")
            .unwrap()
            .on_shutdown(|| std::future::pending::<Result<(), BoxError>>());
        coordinator.configure(ShutdownOptions::new(config(50)));

        let started = tokio::time::Instant::now();
        let outcome = coordinator.shutdown(ShutdownReason::Requested).await;

        assert!(matches!(
            outcome,
            ShutdownOutcome::ForcedExit(ShutdownError::DependencyTimeout(t)) if t == Duration::from_millis(50)
        ));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(60));
        assert_eq!(recorder.codes(), vec![FORCED_EXIT_CODE]);
        assert_eq!(coordinator.phase(), ShutdownPhase::Exited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_precedes_everything() {
        let (coordinator, _, _) = coordinator(&[]);
        let mut phases = coordinator.subscribe();
        coordinator.configure(ShutdownOptions::new(ShutdownConfig {
            delay_ms: 200,
            ..ShutdownConfig::default()
        }));

        let started = tokio::time::Instant::now();
        let outcome = {
            let outcome = coordinator.shutdown(ShutdownReason::Requested);
            tokio::pin!(outcome);
            tokio::select! {
                _ = &mut outcome => panic!("finished before the delay"),
                _ = phases.wait_for(|p| *p == ShutdownPhase::Delaying) => {}
            }
            outcome.await
        };

        assert!(matches!(outcome, ShutdownOutcome::Completed(_)));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_configuration_ignored_after_start() {
        let (coordinator, _, _) = coordinator(&[]);
        coordinator.configure(ShutdownOptions::new(config(100)));
        coordinator.shutdown(ShutdownReason::Requested).await;

        coordinator.configure(ShutdownOptions::new(config(9_999)));
        assert_eq!(coordinator.options().config.dependency_timeout_ms, 100);
    }

    #[tokio::test]
    async fn test_timers_purged() {
        let registry = Arc::new(DependencyRegistry::new(Arc::new(ReadinessTracker::new())));
        let timers = Arc::new(TimerLedger::new());
        let coordinator = ShutdownCoordinator::new(registry, timers.clone(), Arc::new(Recorder::default()));

        timers.set_interval(Duration::from_secs(60), || async {});
        timers.set_timeout(Duration::from_secs(60), async {});

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert_eq!(report.timers_cleared, 2);
        assert!(timers.is_empty());
    }

    #[tokio::test]
    async fn test_watchdog_armed_after_timer_purge() {
        let registry = Arc::new(DependencyRegistry::new(Arc::new(ReadinessTracker::new())));
        let timers = Arc::new(TimerLedger::new());
        let recorder = Arc::new(Recorder::default());
        let coordinator = ShutdownCoordinator::new(registry, timers.clone(), recorder.clone());
        timers.set_interval(Duration::from_secs(60), || async {});

        let ShutdownOutcome::Completed(report) = coordinator.shutdown(ShutdownReason::Requested).await else {
            panic!("expected completed shutdown");
        };
        assert_eq!(report.timers_cleared, 1);
        assert!(recorder.codes().is_empty());

        // The watchdog runs on an OS thread, so real time has to pass.
        tokio::time::sleep(EXIT_WATCHDOG + Duration::from_millis(500)).await;
        assert_eq!(recorder.codes(), vec![FORCED_EXIT_CODE]);
    }
}
