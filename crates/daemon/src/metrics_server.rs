//! Metrics HTTP Server for HEVC Sweep
//!
//! Exposes scan progress as JSON for dashboards and monitoring tools.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::metrics::{now_unix_ms, MetricsSnapshot, SharedMetrics};

/// Errors that can occur when running the metrics server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Handler for GET /metrics endpoint
async fn get_metrics(State(metrics): State<SharedMetrics>) -> Json<MetricsSnapshot> {
    let mut snapshot = metrics.read().await.clone();
    snapshot.timestamp_unix_ms = now_unix_ms();
    Json(snapshot)
}

/// Creates the axum Router with metrics endpoint
pub fn create_metrics_router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .with_state(metrics)
}

/// Runs the metrics HTTP server on `bind` (e.g. `127.0.0.1:7879`)
pub async fn run_metrics_server(metrics: SharedMetrics, bind: &str) -> Result<(), ServerError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind.to_string()))?;

    let app = create_metrics_router(metrics);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
