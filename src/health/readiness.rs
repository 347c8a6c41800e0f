//! Aggregate readiness and liveness.
//!
//! # States
//! ```text
//! Readiness: pending dependencies > 0 → not ready
//!            pending dependencies = 0 → ready (vacuously with zero)
//!
//! Liveness:  Unset → follows readiness
//!            Alive / Dead → fixed, independent of readiness
//! ```
//!
//! # Design Decisions
//! - Readiness is a counter of not-yet-ready dependencies, decremented once per
//!   dependency on its false → true transition
//! - The on-ready callback is taken out of its slot when dispatched, so it can
//!   only ever run once
//! - Dispatch is spawned, never inline, so the callback cannot re-enter the
//!   `set_ready` caller

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::observability::metrics;

/// Callback invoked once aggregate readiness is reached.
pub type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

/// Explicit liveness override.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Unset = 0,
    Alive = 1,
    Dead = 2,
}

impl From<u8> for Liveness {
    fn from(val: u8) -> Self {
        match val {
            1 => Liveness::Alive,
            2 => Liveness::Dead,
            _ => Liveness::Unset,
        }
    }
}

/// Tracks whether every registered dependency is ready.
pub struct ReadinessTracker {
    /// Dependencies that have not called `set_ready` yet.
    pending: AtomicUsize,
    /// Set once the dependency set has been created.
    armed: AtomicBool,
    alive: AtomicU8,
    on_ready: Mutex<Option<ReadyCallback>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            armed: AtomicBool::new(false),
            alive: AtomicU8::new(Liveness::Unset as u8),
            on_ready: Mutex::new(None),
        }
    }

    /// Record the size of the freshly created dependency set.
    pub(crate) fn arm(&self, count: usize) {
        self.pending.store(count, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// A single dependency transitioned to ready.
    pub(crate) fn dependency_ready(&self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of dependencies that are not ready yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// True when every registered dependency is ready.
    pub fn is_ready(&self) -> bool {
        self.pending() == 0
    }

    /// Explicit liveness if it was ever set, otherwise readiness.
    pub fn is_alive(&self) -> bool {
        match self.liveness() {
            Liveness::Unset => self.is_ready(),
            Liveness::Alive => true,
            Liveness::Dead => false,
        }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from(self.alive.load(Ordering::SeqCst))
    }

    pub fn set_alive(&self) {
        self.alive.store(Liveness::Alive as u8, Ordering::SeqCst);
        metrics::record_health(self.is_ready(), true);
    }

    pub fn set_dead(&self) {
        self.alive.store(Liveness::Dead as u8, Ordering::SeqCst);
        tracing::warn!("Process marked dead");
        metrics::record_health(self.is_ready(), false);
    }

    /// Register the callback fired once aggregate readiness is reached.
    ///
    /// Replaces any callback that has not fired yet. If the dependency set was
    /// already created and is ready, the callback is scheduled right away.
    pub fn on_ready<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_ready.lock().expect("readiness callback mutex poisoned") = Some(Box::new(callback));
        if self.armed.load(Ordering::SeqCst) {
            self.check();
        }
    }

    /// Re-evaluate aggregate readiness and dispatch the callback if due.
    pub(crate) fn check(&self) {
        let ready = self.is_ready();
        metrics::record_health(ready, self.is_alive());

        if !ready || !self.armed.load(Ordering::SeqCst) {
            return;
        }

        let callback = self
            .on_ready
            .lock()
            .expect("readiness callback mutex poisoned")
            .take();

        if let Some(callback) = callback {
            tracing::info!("All dependencies ready");
            dispatch(callback);
        }
    }
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReadinessTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessTracker")
            .field("pending", &self.pending())
            .field("armed", &self.armed.load(Ordering::SeqCst))
            .field("liveness", &self.liveness())
            .finish()
    }
}

fn dispatch(callback: ReadyCallback) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { callback() });
        }
        Err(_) => {
            std::thread::spawn(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_vacuously_ready_and_alive() {
        let tracker = ReadinessTracker::new();
        assert!(tracker.is_ready());
        assert!(tracker.is_alive());
        assert_eq!(tracker.liveness(), Liveness::Unset);
    }

    #[test]
    fn test_liveness_follows_readiness_until_set() {
        let tracker = ReadinessTracker::new();
        tracker.arm(1);
        assert!(!tracker.is_ready());
        assert!(!tracker.is_alive());

        tracker.set_alive();
        assert!(tracker.is_alive());
        assert!(!tracker.is_ready());

        tracker.dependency_ready();
        tracker.set_dead();
        assert!(tracker.is_ready());
        assert!(!tracker.is_alive());
    }

    #[tokio::test]
    async fn test_callback_is_deferred() {
        let tracker = ReadinessTracker::new();
        let (count, callback) = counter();
        tracker.on_ready(callback);
        tracker.arm(0);
        tracker.check();

        // Spawned, not run inline.
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_registered_after_ready() {
        let tracker = ReadinessTracker::new();
        tracker.arm(1);
        tracker.dependency_ready();
        tracker.check();

        let (count, callback) = counter();
        tracker.on_ready(callback);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tracker.check();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_not_fired_before_creation() {
        let tracker = ReadinessTracker::new();
        let (count, callback) = counter();
        tracker.on_ready(callback);
        tracker.check();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
