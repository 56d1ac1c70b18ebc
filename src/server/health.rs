//! Liveness endpoint for Kubernetes
//!
//! - `/healthz` - Liveness: Is the process alive?
//!
//! Deliberately minimal: the probe does not reflect reconciliation
//! backlog or error state. A key stuck in backoff is an expected
//! operating condition, not a reason to restart the controller.

use axum::{http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Liveness probe handler
///
/// Always returns 200 OK - if this responds, the process is alive.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

fn build_router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

/// Run the health server on the specified port
///
/// Responds to GET /healthz with 200 OK. Runs until aborted.
pub async fn run_health_server(port: u16) -> Result<(), std::io::Error> {
    let app = build_router();

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(port = %port, "Health server listening");

    axum::serve(listener, app)
        .await
        .map_err(std::io::Error::other)
}
