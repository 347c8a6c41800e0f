//! Shared utilities for the integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use warden::http::HttpServer;
use warden::lifecycle::{Lifecycle, ProcessExit};

/// Records exit codes instead of ending the test process.
#[derive(Default)]
pub struct RecordingExit(Mutex<Vec<i32>>);

impl RecordingExit {
    pub fn codes(&self) -> Vec<i32> {
        self.0.lock().unwrap().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.0.lock().unwrap().push(code);
    }
}

/// A lifecycle whose forced exits are recorded.
pub fn lifecycle() -> (Arc<Lifecycle>, Arc<RecordingExit>) {
    let exit = Arc::new(RecordingExit::default());
    (Lifecycle::with_exit(exit.clone()), exit)
}

/// Serve `router` on an ephemeral localhost port.
#[allow(dead_code)]
pub async fn start_server(router: Router) -> Arc<HttpServer> {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Arc::new(HttpServer::bind(addr, 16, router).await.unwrap())
}

/// A client that never pools or goes through a system proxy.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
