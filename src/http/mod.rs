//! HTTP primary component.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → net::Listener (connection limit)
//!     → server.rs (hyper-util auto builder, HTTP/1.1 + HTTP/2)
//!     → caller's axum Router
//!
//! Shutdown:
//!     terminate(graceful) → stop accept → graceful close per connection
//!     → wait up to graceful → abort the rest
//! ```

pub mod server;

pub use server::{DrainReport, HttpServer};
