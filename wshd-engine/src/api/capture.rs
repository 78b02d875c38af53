//! Capture ingress endpoints
//!
//! The capture adapter (instrument input) delivers discrete timestamped
//! events here; musical semantics are passed through unvalidated.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use wshd_common::db::models::CaptureEvent;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    /// Session the event was recorded into, if any
    pub session_id: Option<i64>,
}

/// POST /api/capture/event
///
/// Always 200: capture-path storage failures are logged, never surfaced.
pub async fn capture_event(
    State(state): State<AppState>,
    Json(event): Json<CaptureEvent>,
) -> Json<CaptureResponse> {
    let session_id = state.lifecycle.capture(event).await;
    Json(CaptureResponse { session_id })
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    pub session_id: i64,
}

/// POST /api/session/end
pub async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<EndSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .lifecycle
        .end_session(request.session_id)
        .await
        .map_err(ApiError::Common)?;

    Ok(Json(serde_json::json!({ "ended": true })))
}

/// Build capture routes
pub fn capture_routes() -> Router<AppState> {
    Router::new()
        .route("/api/capture/event", post(capture_event))
        .route("/api/session/end", post(end_session))
}
