//! Shared test fixtures: temp databases and an in-process mock remote store

// Not every test binary uses every fixture
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use wshd_common::db::models::{CaptureEvent, InputSource};

/// Controllable stand-in for the remote store.
///
/// Tests flip the knobs (failing uploads, deleted sessions, broken record
/// kinds) and inspect what the engine sent.
#[derive(Clone, Default)]
pub struct MockRemote {
    /// client_refs whose uploads answer 500
    pub fail_refs: Arc<Mutex<HashSet<i64>>>,
    /// Uploaded sessions by remote id
    pub sessions: Arc<Mutex<HashMap<Uuid, Value>>>,
    /// Upload log: client_ref per accepted upload, in arrival order
    pub upload_log: Arc<Mutex<Vec<i64>>>,
    /// Records served per kind for query_by_owner
    pub kinds: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    /// Kinds whose queries answer 500
    pub fail_kinds: Arc<Mutex<HashSet<String>>>,
    /// Health probe switch
    pub healthy: Arc<AtomicBool>,
    /// Artificial latency for existence checks, in milliseconds
    pub exists_delay_ms: Arc<AtomicU64>,
}

impl MockRemote {
    /// Spawn the mock server on an ephemeral port; returns (handle, base_url)
    pub async fn spawn() -> (Self, String) {
        let mock = Self::default();
        mock.healthy.store(true, Ordering::SeqCst);

        let app = Router::new()
            .route("/health", get(health))
            .route("/api/sessions", post(upload_session))
            .route("/api/sessions/:remote_id", get(session_exists))
            .route("/api/users/:user_id/:kind", get(query_by_owner))
            .with_state(mock.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (mock, format!("http://{}", addr))
    }

    pub fn fail_upload(&self, client_ref: i64) {
        self.fail_refs.lock().unwrap().insert(client_ref);
    }

    pub fn clear_upload_failures(&self) {
        self.fail_refs.lock().unwrap().clear();
    }

    pub fn delete_session(&self, remote_id: Uuid) {
        self.sessions.lock().unwrap().remove(&remote_id);
    }

    pub fn set_kind(&self, kind: &str, records: Vec<Value>) {
        self.kinds.lock().unwrap().insert(kind.to_string(), records);
    }

    pub fn fail_kind(&self, kind: &str) {
        self.fail_kinds.lock().unwrap().insert(kind.to_string());
    }

    pub fn set_exists_delay(&self, ms: u64) {
        self.exists_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn uploads_for(&self, client_ref: i64) -> usize {
        self.upload_log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| **r == client_ref)
            .count()
    }

    pub fn session_payload(&self, remote_id: Uuid) -> Option<Value> {
        self.sessions.lock().unwrap().get(&remote_id).cloned()
    }
}

async fn health(State(mock): State<MockRemote>) -> impl IntoResponse {
    if mock.healthy.load(Ordering::SeqCst) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "down")
    }
}

async fn upload_session(
    State(mock): State<MockRemote>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let client_ref = payload.get("client_ref").and_then(Value::as_i64).unwrap_or(-1);

    if mock.fail_refs.lock().unwrap().contains(&client_ref) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })));
    }

    // Reuse a remote id from an earlier partial attempt (idempotent create)
    let remote_id = payload
        .get("remote_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    mock.sessions.lock().unwrap().insert(remote_id, payload);
    mock.upload_log.lock().unwrap().push(client_ref);

    (StatusCode::OK, Json(json!({ "remote_id": remote_id })))
}

async fn session_exists(
    State(mock): State<MockRemote>,
    Path(remote_id): Path<Uuid>,
) -> impl IntoResponse {
    let delay = mock.exists_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
    if mock.sessions.lock().unwrap().contains_key(&remote_id) {
        (StatusCode::OK, Json(json!({ "exists": true })))
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
    }
}

async fn query_by_owner(
    State(mock): State<MockRemote>,
    Path((_user_id, kind)): Path<(String, String)>,
) -> impl IntoResponse {
    if mock.fail_kinds.lock().unwrap().contains(&kind) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })));
    }

    let records = mock
        .kinds
        .lock()
        .unwrap()
        .get(&kind)
        .cloned()
        .unwrap_or_default();

    (StatusCode::OK, Json(Value::Array(records)))
}

/// Fresh temp database pool
pub async fn test_pool() -> (tempfile::TempDir, sqlx::SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = wshd_common::db::init_database(&dir.path().join("woodshed.db"))
        .await
        .unwrap();
    (dir, pool)
}

pub fn midi_event(timestamp_ms: i64, note: i64) -> CaptureEvent {
    CaptureEvent {
        kind: "note_on".to_string(),
        note: Some(note),
        note_name: Some(note_name(note)),
        velocity: Some(90),
        channel: Some(0),
        timestamp_ms,
        source: InputSource::Midi,
    }
}

fn note_name(note: i64) -> String {
    const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = note / 12 - 1;
    format!("{}{}", NAMES[(note % 12) as usize], octave)
}

/// Insert a completed session with `event_count` ordered events; returns its id
pub async fn seed_completed_session(pool: &sqlx::SqlitePool, event_count: usize) -> i64 {
    use chrono::{Duration, Utc};
    use wshd_common::db::{events, sessions};

    let started = Utc::now() - Duration::minutes(10);
    let id = sessions::insert_session(pool, InputSource::Midi, started).await.unwrap();

    for i in 0..event_count {
        events::insert_event(pool, id, &midi_event(i as i64 * 100, 60 + i as i64)).await.unwrap();
    }

    let ended = started + Duration::minutes(5);
    sessions::complete_session(pool, id, ended, 5 * 60 * 1000).await.unwrap();
    id
}
