//! HTTP server as a drainable primary component.
//!
//! # Responsibilities
//! - Serve an Axum `Router` over the bounded listener (HTTP/1.1 and HTTP/2)
//! - Track every connection for graceful shutdown
//! - On terminate: stop accepting, let in-flight requests finish, then
//!   force-close whatever is left at the graceful bound
//!
//! # Design Decisions
//! - Connections run in a `JoinSet` owned by the accept loop so they can be
//!   aborted together; `axum::serve` cannot force-close its connections
//! - The drain signal carries the graceful timeout, so the same watch channel
//!   starts the drain and bounds it

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::BoxError;
use crate::lifecycle::PrimaryComponent;
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// Pause after a failed accept, so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections still open when the drain started.
    pub in_flight: usize,
    /// Connections aborted at the graceful bound.
    pub forced: usize,
}

/// An HTTP server that can be drained by the shutdown sequence.
pub struct HttpServer {
    local_addr: SocketAddr,
    connections: ConnectionTracker,
    drain: watch::Sender<Option<Duration>>,
    task: Mutex<Option<JoinHandle<DrainReport>>>,
}

impl HttpServer {
    /// Bind `addr` and start serving `router`.
    pub async fn bind(
        addr: SocketAddr,
        max_connections: usize,
        router: Router,
    ) -> Result<Self, ListenerError> {
        let listener = Listener::bind(addr, max_connections).await?;
        Self::serve(listener, router)
    }

    /// Start serving `router` on an already bound listener.
    pub fn serve(listener: Listener, router: Router) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let connections = ConnectionTracker::new();
        let (drain, drain_rx) = watch::channel(None);

        let task = tokio::spawn(accept_loop(listener, router, connections.clone(), drain_rx));

        tracing::info!(address = %local_addr, "HTTP server starting");

        Ok(Self {
            local_addr,
            connections,
            drain,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }

    /// Drain the server and wait for the accept loop to finish.
    ///
    /// Returns `None` if the server was already drained.
    pub async fn drain(&self, graceful_timeout: Duration) -> Result<Option<DrainReport>, BoxError> {
        let task = self.task.lock().expect("http server task mutex poisoned").take();
        let Some(task) = task else {
            tracing::debug!(address = %self.local_addr, "HTTP server already drained");
            return Ok(None);
        };

        tracing::info!(
            address = %self.local_addr,
            active_connections = self.active_connections(),
            graceful_timeout = ?graceful_timeout,
            "Draining HTTP server"
        );
        self.drain.send_replace(Some(graceful_timeout));

        let report = task.await?;
        tracing::info!(
            in_flight = report.in_flight,
            forced = report.forced,
            "HTTP server stopped"
        );
        Ok(Some(report))
    }
}

#[async_trait]
impl PrimaryComponent for HttpServer {
    fn name(&self) -> &str {
        "http"
    }

    async fn terminate(&self, graceful_timeout: Duration) -> Result<(), BoxError> {
        self.drain(graceful_timeout).await.map(|_| ())
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("local_addr", &self.local_addr)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    connections: ConnectionTracker,
    mut drain: watch::Receiver<Option<Duration>>,
) -> DrainReport {
    let mut tasks = JoinSet::new();

    let graceful_timeout = loop {
        tokio::select! {
            changed = drain.changed() => {
                match changed {
                    Ok(()) => {
                        if let Some(timeout) = *drain.borrow_and_update() {
                            break timeout;
                        }
                    }
                    // Server handle dropped without draining.
                    Err(_) => break Duration::ZERO,
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = connections.track();
                    tasks.spawn(serve_connection(
                        stream,
                        peer,
                        router.clone(),
                        guard,
                        permit,
                        drain.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    };

    // Stop accepting before waiting on the open connections.
    drop(listener);

    let in_flight = tasks.len();
    let drained = tokio::time::timeout(graceful_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_ok();

    let forced = if drained {
        0
    } else {
        let remaining = tasks.len();
        tracing::warn!(
            remaining,
            graceful_timeout = ?graceful_timeout,
            "Graceful timeout elapsed, closing remaining connections"
        );
        tasks.shutdown().await;
        remaining
    };

    DrainReport { in_flight, forced }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    mut drain: watch::Receiver<Option<Duration>>,
) {
    let id = guard.id();
    let builder = Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        // Only the wake-up matters; the borrowed value must not outlive this arm.
        _ = async { let _ = drain.wait_for(Option::is_some).await; } => {
            tracing::debug!(connection = %id, peer = %peer, "Draining connection");
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(connection = %id, peer = %peer, error = %e, "Connection error");
    }
    tracing::trace!(connection = %id, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_connection_task_is_send() {
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), 1).await.unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, peer, permit) = listener.accept().await.unwrap();
        let (_drain, drain_rx) = watch::channel(None);

        let task = serve_connection(
            stream,
            peer,
            Router::new(),
            ConnectionTracker::new().track(),
            permit,
            drain_rx,
        );
        assert_send(&task);
    }

    #[tokio::test]
    async fn test_drain_with_no_connections() {
        let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), 4, Router::new())
            .await
            .unwrap();
        let report = server.drain(Duration::from_millis(50)).await.unwrap();
        assert_eq!(report, Some(DrainReport { in_flight: 0, forced: 0 }));
        assert!(TcpStream::connect(server.local_addr()).await.is_err());
    }
}
