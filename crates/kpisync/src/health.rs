//! Liveness, readiness and metrics endpoints.
//!
//! The sync loop itself is blocking, so the listener runs on its own thread
//! with a single-threaded tokio runtime.

use std::net::SocketAddr;
use std::thread::JoinHandle;

use axum::Router;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use kpisync_spec::MetricsSpec;
use tracing::{error, info};

use crate::metrics;

async fn alive() -> &'static str {
    "Alive."
}

async fn ready() -> &'static str {
    "Ready."
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}

pub fn router(spec: &MetricsSpec) -> Router {
    Router::new()
        .route(&spec.metrics_path, get(metrics_text))
        .route(&spec.ready_path, get(ready))
        .route(&spec.alive_path, get(alive))
}

/// Handle to the background listener.
#[derive(Debug)]
pub struct HealthServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl HealthServer {
    /// Bind `spec.address` and serve on a background thread. Bind errors are
    /// returned to the caller; later serve errors are logged.
    pub fn spawn(spec: &MetricsSpec) -> std::io::Result<Self> {
        let addr: SocketAddr = spec
            .address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let app = router(spec);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let handle = std::thread::Builder::new()
            .name("kpisync-health".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => listener,
                        Err(err) => {
                            error!(error = %err, "health listener setup failed");
                            return;
                        }
                    };
                    info!(%addr, "health and metrics listener up");
                    if let Err(err) = axum::serve(listener, app).await {
                        error!(error = %err, "health listener stopped");
                    }
                })
            })?;
        Ok(Self { addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
