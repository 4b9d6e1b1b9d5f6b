//! Health check HTTP endpoint for deployment platform monitoring.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

/// Static details reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct HealthState {
    pub version: String,
    pub ffprobe_path: String,
}

impl HealthState {
    /// Health state for this build and the resolved probe tool.
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub ffprobe: String,
}

/// Router serving `/health` and `/`.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(health_handler))
        .with_state(Arc::new(state))
}

/// Start the health check HTTP server.
pub async fn start_health_server(port: u16, state: HealthState) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port = port, "Starting health check server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port = port, "Failed to bind health check port");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, health_router(state)).await {
        tracing::error!(error = %e, "Health check server failed");
    }
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        ffprobe: state.ffprobe_path.clone(),
    })
}

/// Spawn the health check server as a background task.
pub fn spawn_health_server(port: u16, state: HealthState) {
    tokio::spawn(async move {
        start_health_server(port, state).await;
    });
}
