//! Health Routes
//!
//! - GET /health - Status plus the number of connected dashboard clients

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Live WebSocket connections
    pub clients: usize,
    /// Active data provider
    pub provider: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health
///
/// Never touches the data provider; the hub's connection count is enough to
/// show the process is serving.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        clients: state.client_count().await,
        provider: state.provider.name().to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
