//! Replay endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::replay::ReplayState;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    /// Absent: load the most recently completed session
    pub session_id: Option<i64>,
}

/// GET /api/replay?session_id=N
pub async fn load_replay(
    State(state): State<AppState>,
    Query(query): Query<ReplayQuery>,
) -> Json<ReplayState> {
    Json(state.replay.load(query.session_id).await)
}

/// GET /api/replay/state
///
/// Current loader state, including `deleted` reported by the poller after
/// the initial load.
pub async fn replay_state(State(state): State<AppState>) -> Json<ReplayState> {
    Json(state.replay.state().await)
}

/// POST /api/replay/unload
///
/// The consuming view unmounted; stops the poller.
pub async fn unload_replay(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.replay.unload().await;
    Json(serde_json::json!({ "unloaded": true }))
}

/// Build replay routes
pub fn replay_routes() -> Router<AppState> {
    Router::new()
        .route("/api/replay", get(load_replay))
        .route("/api/replay/state", get(replay_state))
        .route("/api/replay/unload", post(unload_replay))
}
