//! Export download endpoint

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    routing::get,
    Router,
};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/export
///
/// Serves the combined snapshot as a file download, gzip-compressed above
/// the session-count threshold.
pub async fn download_export(State(state): State<AppState>) -> ApiResult<(HeaderMap, Vec<u8>)> {
    let user_id = state.migration.current_user().await;
    let output = state
        .export
        .assemble(user_id.as_deref())
        .await
        .map_err(ApiError::Common)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if output.gzipped {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    let disposition = format!("attachment; filename=\"{}\"", output.filename);
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .map_err(|e| ApiError::Internal(format!("Invalid export filename: {}", e)))?,
    );

    Ok((headers, output.bytes))
}

/// Build export routes
pub fn export_routes() -> Router<AppState> {
    Router::new().route("/api/export", get(download_export))
}
