//! Metrics collection and exposition.
//!
//! # Metrics
//! - `warden_ready` (gauge): 1=ready, 0=not ready
//! - `warden_alive` (gauge): 1=alive, 0=dead
//! - `warden_shutting_down` (gauge): 1 once shutdown has begun
//! - `warden_timers_outstanding` (gauge): ledger size by `kind`
//! - `warden_dependency_shutdown_total` (counter): by `dependency`, `outcome`
//! - `warden_forced_exits_total` (counter): by `reason`
//! - `warden_shutdown_duration_seconds` (histogram): signal to sequence end
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op without a recorder
//! - The Prometheus exporter is installed only by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_health(ready: bool, alive: bool) {
    gauge!("warden_ready").set(if ready { 1.0 } else { 0.0 });
    gauge!("warden_alive").set(if alive { 1.0 } else { 0.0 });
}

pub fn record_shutting_down() {
    gauge!("warden_shutting_down").set(1.0);
}

pub fn record_timers(timeouts: usize, intervals: usize) {
    gauge!("warden_timers_outstanding", "kind" => "timeout").set(timeouts as f64);
    gauge!("warden_timers_outstanding", "kind" => "interval").set(intervals as f64);
}

pub fn record_dependency_shutdown(dependency: &str, outcome: &'static str) {
    counter!(
        "warden_dependency_shutdown_total",
        "dependency" => dependency.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_forced_exit(reason: &'static str) {
    counter!("warden_forced_exits_total", "reason" => reason).increment(1);
}

pub fn record_shutdown_duration(elapsed: Duration) {
    histogram!("warden_shutdown_duration_seconds").record(elapsed.as_secs_f64());
}
