//! Socket plumbing for the HTTP primary component.
//!
//! # Data Flow
//! ```text
//! peer connects
//!     → listener.rs (waits for a free slot, then accepts)
//!     → connection.rs (counted until the connection task ends)
//!     → http::server serves it
//! ```

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
