//! Warden service runner.
//!
//! Serves a minimal HTTP surface under the lifecycle coordinator and drains it
//! on the configured signals.
//!
//! ```text
//!   signal ──▶ Lifecycle ──▶ HttpServer.terminate(graceful)
//!                        ──▶ dependency shutdown actions (parallel, bounded)
//!                        ──▶ timer purge ──▶ main returns
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;

use warden::config::{load_config, WardenConfig};
use warden::http::HttpServer;
use warden::lifecycle::{Lifecycle, ShutdownOptions};
use warden::observability::{logging, metrics};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Run a service under health and graceful-shutdown coordination", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the server bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => WardenConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "warden starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let lifecycle = Lifecycle::new();
    let dependencies = lifecycle.create_dependencies(config.dependencies.names.iter().cloned())?;
    lifecycle.on_ready(|| tracing::info!("Service ready for traffic"));

    // Purged with every other timer once shutdown reaches the ledger.
    let status = Arc::clone(&lifecycle);
    lifecycle.timers().set_interval(STATUS_INTERVAL, move || {
        let status = Arc::clone(&status);
        async move {
            tracing::debug!(
                ready = status.is_ready(),
                alive = status.is_alive(),
                pending = status.readiness().pending(),
                "Status"
            );
        }
    });

    let router = Router::new()
        .route("/", get(|| async { "warden\n" }))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server.bind_address.parse()?;
    let server = HttpServer::bind(addr, config.server.max_connections, router).await?;
    tracing::info!(address = %server.local_addr(), "Listening for connections");

    lifecycle.configure_shutdown(
        ShutdownOptions::new(config.shutdown.clone()).with_primary(Arc::new(server)),
    );
    let _signals = lifecycle.listen_for_signals()?;

    // Configured dependencies have no connect step of their own here.
    for dependency in &dependencies {
        dependency.set_ready();
    }

    lifecycle.wait().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
