//! Remote store API client
//!
//! Thin reqwest wrapper over the authoritative multi-user store. Every call
//! carries a bounded timeout so one unreachable record cannot stall a batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use wshd_common::db::models::{PracticeEvent, PracticeSession};

const USER_AGENT: &str = "Woodshed/0.1.0";

/// Remote store client errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<RemoteError> for wshd_common::Error {
    fn from(e: RemoteError) -> Self {
        wshd_common::Error::Http(e.to_string())
    }
}

/// Upload payload: a session's metadata plus its ordered events as one unit,
/// never interleaved with another session's upload.
#[derive(Debug, Serialize)]
pub struct UploadSessionRequest<'a> {
    /// Local id, passed as a client reference so retried uploads are
    /// recognizable server-side
    pub client_ref: i64,
    /// Remote id from an earlier partial attempt, reused for idempotency
    pub remote_id: Option<Uuid>,
    pub user_id: &'a str,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub source: &'a str,
    pub events: Vec<UploadEvent<'a>>,
}

#[derive(Debug, Serialize)]
pub struct UploadEvent<'a> {
    pub kind: &'a str,
    pub note: Option<i64>,
    pub note_name: Option<&'a str>,
    pub velocity: Option<i64>,
    pub channel: Option<i64>,
    pub timestamp_ms: i64,
    pub source: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadSessionResponse {
    remote_id: Uuid,
}

/// HTTP client for the remote store
pub struct RemoteClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload one session with its events; returns the remote id.
    ///
    /// When a remote id is already known from a partial earlier attempt it is
    /// sent along, and the remote store must not create a duplicate record.
    pub async fn upload_session(
        &self,
        session: &PracticeSession,
        events: &[PracticeEvent],
        user_id: &str,
    ) -> Result<Uuid, RemoteError> {
        let request = UploadSessionRequest {
            client_ref: session.id,
            remote_id: session.remote_id,
            user_id,
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.map(|dt| dt.to_rfc3339()),
            duration_ms: session.duration_ms,
            source: session.source.as_str(),
            events: events
                .iter()
                .map(|e| UploadEvent {
                    kind: &e.kind,
                    note: e.note,
                    note_name: e.note_name.as_deref(),
                    velocity: e.velocity,
                    channel: e.channel,
                    timestamp_ms: e.timestamp_ms,
                    source: e.source.as_str(),
                })
                .collect(),
        };

        let response = self
            .http_client
            .post(format!("{}/api/sessions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), error_text));
        }

        let body: UploadSessionResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))?;

        Ok(body.remote_id)
    }

    /// Check whether a session record still exists remotely
    pub async fn session_exists(&self, remote_id: Uuid) -> Result<bool, RemoteError> {
        let response = self
            .http_client
            .get(format!("{}/api/sessions/{}", self.base_url, remote_id))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => {
                let error_text = response.text().await.unwrap_or_default();
                Err(RemoteError::Api(s.as_u16(), error_text))
            }
        }
    }

    /// Query all records of one kind owned by a user (export assembly)
    pub async fn query_by_owner(
        &self,
        kind: &str,
        user_id: &str,
    ) -> Result<Vec<serde_json::Value>, RemoteError> {
        let response = self
            .http_client
            .get(format!("{}/api/users/{}/{}", self.base_url, user_id, kind))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }

    /// Liveness probe used by the connectivity monitor
    pub async fn health(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
