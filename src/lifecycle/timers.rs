//! Ledger of scheduled timeouts and intervals.
//!
//! # Responsibilities
//! - Schedule delayed and periodic work as Tokio tasks
//! - Remember every outstanding timer so shutdown can purge them en masse
//! - Let callers exempt timers that must survive the purge
//!
//! # Design Decisions
//! - Timers are keyed by issuance order (`TimerId`)
//! - A timeout leaves the ledger when it fires, before its work runs, so a
//!   purge never interrupts work that is already under way
//! - Aborted or panicked tasks are pruned lazily when counting

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// Shortest period accepted by [`TimerLedger::set_interval`].
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Identifier of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Timeout,
    Interval,
}

/// Outstanding timers by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerCounts {
    pub timeouts: usize,
    pub intervals: usize,
}

impl TimerCounts {
    pub fn total(&self) -> usize {
        self.timeouts + self.intervals
    }
}

#[derive(Debug)]
struct Entry {
    kind: TimerKind,
    exempt: bool,
    handle: AbortHandle,
}

/// Process-wide registry of scheduled work.
///
/// All scheduling methods must be called from within a Tokio runtime.
#[derive(Debug, Default)]
pub struct TimerLedger {
    entries: Arc<DashMap<TimerId, Entry>>,
    next_id: AtomicU64,
}

impl TimerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Run `task` once after `delay`.
    pub fn set_timeout<F>(&self, delay: Duration, task: F) -> TimerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.issue();
        let entries = Arc::clone(&self.entries);
        let (tracked_tx, tracked_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            // The entry must exist before the timer can remove it.
            let _ = tracked_rx.await;
            time::sleep(delay).await;
            entries.remove(&id);
            task.await;
        });

        self.track(id, TimerKind::Timeout, handle.abort_handle());
        let _ = tracked_tx.send(());
        id
    }

    /// Run `task` every `period`, first after one full period.
    pub fn set_interval<F, Fut>(&self, period: Duration, mut task: F) -> TimerId
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.issue();
        let period = period.max(MIN_INTERVAL);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                task().await;
            }
        });

        self.track(id, TimerKind::Interval, handle.abort_handle());
        id
    }

    fn track(&self, id: TimerId, kind: TimerKind, handle: AbortHandle) {
        self.entries.insert(
            id,
            Entry {
                kind,
                exempt: false,
                handle,
            },
        );
        tracing::trace!(timer = %id, ?kind, "Timer scheduled");
        self.publish();
    }

    /// Cancel a single timer. Returns false if it was unknown or already fired.
    pub fn clear(&self, id: TimerId) -> bool {
        match self.entries.remove(&id) {
            Some((_, entry)) => {
                entry.handle.abort();
                self.publish();
                !entry.handle.is_finished()
            }
            None => false,
        }
    }

    /// Keep `id` alive across [`clear_all`](Self::clear_all).
    pub fn exempt(&self, id: TimerId) -> bool {
        match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.exempt = true;
                true
            }
            None => false,
        }
    }

    /// Cancel every non-exempt timer. Returns how many were still pending.
    pub fn clear_all(&self) -> usize {
        let ids: Vec<TimerId> = self
            .entries
            .iter()
            .filter(|entry| !entry.exempt)
            .map(|entry| *entry.key())
            .collect();

        let mut cleared = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(&id) {
                if !entry.handle.is_finished() {
                    cleared += 1;
                }
                entry.handle.abort();
            }
        }

        tracing::info!(cleared, remaining = self.entries.len(), "Timers cleared");
        self.publish();
        cleared
    }

    /// Outstanding timers by kind.
    pub fn counts(&self) -> TimerCounts {
        self.entries.retain(|_, entry| !entry.handle.is_finished());

        let mut counts = TimerCounts::default();
        for entry in self.entries.iter() {
            match entry.kind {
                TimerKind::Timeout => counts.timeouts += 1,
                TimerKind::Interval => counts.intervals += 1,
            }
        }
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts().total() == 0
    }

    fn publish(&self) {
        let counts = self.counts();
        metrics::record_timers(counts.timeouts, counts.intervals);
    }
}
