//! Migration control and identity-callback endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use wshd_common::events::{MigrationProgress, MigrationStatus, WshdEvent};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MigrationStatusResponse {
    pub status: MigrationStatus,
    /// Valid only while migrating
    pub progress: MigrationProgress,
    pub user_id: Option<String>,
}

/// GET /api/migration/status
pub async fn migration_status(State(state): State<AppState>) -> Json<MigrationStatusResponse> {
    Json(MigrationStatusResponse {
        status: state.migration.status().await,
        progress: state.migration.progress().await,
        user_id: state.migration.current_user().await,
    })
}

/// POST /api/migration/trigger
///
/// Runs a cycle to completion and returns the outcome. A run already in
/// flight is not duplicated.
pub async fn trigger_migration(State(state): State<AppState>) -> Json<MigrationStatusResponse> {
    let status = state.migration.trigger().await;
    Json(MigrationStatusResponse {
        status,
        progress: state.migration.progress().await,
        user_id: state.migration.current_user().await,
    })
}

/// POST /api/migration/dismiss
pub async fn dismiss_migration(State(state): State<AppState>) -> Json<MigrationStatusResponse> {
    let status = state.migration.dismiss().await;
    Json(MigrationStatusResponse {
        status,
        progress: state.migration.progress().await,
        user_id: state.migration.current_user().await,
    })
}

/// Identity provider callback payload: a user id, or null on sign-out
#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub user_id: Option<String>,
}

/// POST /api/identity
///
/// Publishes the identity transition on the event bus; the dispatcher routes
/// it to the migration engine.
pub async fn identity_changed(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> Json<serde_json::Value> {
    match request.user_id {
        Some(user_id) => state.event_bus.emit(WshdEvent::Authenticated {
            user_id,
            timestamp: Utc::now(),
        }),
        None => state.event_bus.emit(WshdEvent::SignedOut { timestamp: Utc::now() }),
    }

    Json(serde_json::json!({ "accepted": true }))
}

/// Build migration routes
pub fn migration_routes() -> Router<AppState> {
    Router::new()
        .route("/api/migration/status", get(migration_status))
        .route("/api/migration/trigger", post(trigger_migration))
        .route("/api/migration/dismiss", post(dismiss_migration))
        .route("/api/identity", post(identity_changed))
}
