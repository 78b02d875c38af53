//! Health and connectivity status endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "wshd-engine".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    })
}

/// Connectivity state for "back online" style messaging
#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    pub online: bool,
    /// Transient flag, auto-cleared a few seconds after reconnecting
    pub was_offline: bool,
}

/// GET /api/connectivity
pub async fn connectivity_status(State(state): State<AppState>) -> Json<ConnectivityResponse> {
    Json(ConnectivityResponse {
        online: state.connectivity.online(),
        was_offline: state.connectivity.was_offline(),
    })
}

/// Build health routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/connectivity", get(connectivity_status))
}
