//! Bounded TCP accept for the primary HTTP component.
//!
//! # Responsibilities
//! - Own the bound socket of the serving component
//! - Cap open connections with a semaphore slot per connection
//!
//! # Design Decisions
//! - The slot is taken before `accept`, so a saturated server leaves peers in
//!   the kernel backlog rather than accepting and dropping them
//! - `accept` is cancel-safe and can sit in a `select!` next to a drain signal
//! - Dropping the listener closes the socket; that is how draining stops intake

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind listener: {0}")]
    Bind(std::io::Error),
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
}

/// TCP listener with a fixed number of connection slots.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    pub async fn bind(addr: SocketAddr, capacity: usize) -> Result<Self, ListenerError> {
        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_tcp(socket, capacity)
    }

    /// Take over a socket the caller already bound.
    pub fn from_tcp(socket: TcpListener, capacity: usize) -> Result<Self, ListenerError> {
        let addr = socket.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, max_connections = capacity, "Listener bound");

        Ok(Self {
            socket,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Wait for a free slot, then for the next peer.
    ///
    /// The returned slot is released when the [`ConnectionPermit`] drops.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("connection slot semaphore is never closed");
        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer = %peer,
            free_slots = self.slots.available_permits(),
            "Accepted connection"
        );
        Ok((stream, peer, ConnectionPermit { _slot: slot }))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.capacity
    }
}

/// Holds one connection slot until dropped.
#[derive(Debug)]
pub struct ConnectionPermit {
    _slot: OwnedSemaphorePermit,
}
