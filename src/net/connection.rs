//! Open connection accounting for the HTTP drain.
//!
//! The count lives in a watch channel so observers see every change.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        // Only uniqueness matters here.
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    open: Arc<watch::Sender<u64>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self { open: Arc::new(open) }
    }

    /// Count a connection as open until the returned guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.open.send_modify(|open| *open += 1);
        ConnectionGuard {
            open: Arc::clone(&self.open),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        *self.open.borrow()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one open connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<watch::Sender<u64>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.open.send_modify(|open| *open = open.saturating_sub(1));
    }
}
