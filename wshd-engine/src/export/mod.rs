//! Export assembler
//!
//! Combines remote store record kinds and every local table into one JSON
//! snapshot. Each query is independently fault-tolerant: a broken table
//! yields an empty result plus a per-kind status flag, never a total
//! failure. Secret material is stripped before anything leaves the process.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use wshd_common::db::models::{PracticeEvent, PracticeSession};
use wshd_common::db::{events, sessions};
use wshd_common::{Error, Result};

use crate::sync::remote::RemoteClient;

/// Remote record kinds included in an export
pub const REMOTE_KINDS: [&str; 6] = [
    "profile",
    "sessions",
    "progress",
    "ai_interactions",
    "api_keys",
    "achievements",
];

/// API-key records are reduced to metadata; only these fields survive
const API_KEY_METADATA_FIELDS: [&str; 6] =
    ["id", "name", "provider", "created_at", "last_used_at", "scopes"];

/// Aggregated usage derived from AI-interaction records
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// The assembled snapshot, one JSON document
#[derive(Debug, Serialize)]
pub struct ExportDocument {
    pub exported_at: chrono::DateTime<Utc>,
    pub user_id: Option<String>,
    /// Remote record kinds, secret-stripped
    pub remote: BTreeMap<String, Vec<Value>>,
    pub token_usage: TokenUsage,
    pub local: LocalTables,
    /// Per-kind outcome: "complete", "failed" or "skipped"
    pub export_status: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct LocalTables {
    pub practice_sessions: Vec<PracticeSession>,
    pub practice_events: Vec<PracticeEvent>,
}

/// Assembled bytes ready to serve as a file download
#[derive(Debug)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub gzipped: bool,
    pub filename: String,
}

#[derive(Clone)]
pub struct ExportAssembler {
    db: SqlitePool,
    remote: Arc<RemoteClient>,
    /// Session count at/above which the output is gzip-compressed
    compress_threshold: usize,
}

impl ExportAssembler {
    pub fn new(db: SqlitePool, remote: Arc<RemoteClient>, compress_threshold: usize) -> Self {
        Self { db, remote, compress_threshold }
    }

    /// Assemble the combined snapshot for the given user (or a guest export
    /// of local data only when anonymous).
    pub async fn assemble(&self, user_id: Option<&str>) -> Result<ExportOutput> {
        let document = self.build_document(user_id).await;

        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| Error::Internal(format!("Failed to serialize export: {}", e)))?;

        let session_count = document.local.practice_sessions.len();
        let date = document.exported_at.format("%Y%m%d");

        if session_count >= self.compress_threshold {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&json)
                .and_then(|_| encoder.finish())
                .map(|bytes| {
                    info!(session_count, "Export gzip-compressed");
                    ExportOutput {
                        bytes,
                        gzipped: true,
                        filename: format!("woodshed-export-{}.json.gz", date),
                    }
                })
                .map_err(Error::Io)
        } else {
            Ok(ExportOutput {
                bytes: json,
                gzipped: false,
                filename: format!("woodshed-export-{}.json", date),
            })
        }
    }

    async fn build_document(&self, user_id: Option<&str>) -> ExportDocument {
        let mut remote = BTreeMap::new();
        let mut export_status = BTreeMap::new();
        let mut token_usage = TokenUsage::default();

        for kind in REMOTE_KINDS {
            let (records, status) = match user_id {
                None => (Vec::new(), "skipped"),
                Some(user) => match self.fetch_kind(kind, user).await {
                    Ok(records) => {
                        if kind == "ai_interactions" {
                            token_usage = aggregate_token_usage(&records);
                        }
                        (records, "complete")
                    }
                    Err(e) => {
                        // One broken kind must never fail the whole export
                        warn!(kind, error = %e, "Export query failed for record kind");
                        (Vec::new(), "failed")
                    }
                },
            };
            remote.insert(kind.to_string(), records);
            export_status.insert(kind.to_string(), status.to_string());
        }

        let practice_sessions = match sessions::all_sessions(&self.db).await {
            Ok(rows) => {
                export_status.insert("practice_sessions".to_string(), "complete".to_string());
                rows
            }
            Err(e) => {
                warn!(error = %e, "Export of local sessions failed");
                export_status.insert("practice_sessions".to_string(), "failed".to_string());
                Vec::new()
            }
        };

        let practice_events = match events::all_events(&self.db).await {
            Ok(rows) => {
                export_status.insert("practice_events".to_string(), "complete".to_string());
                rows
            }
            Err(e) => {
                warn!(error = %e, "Export of local events failed");
                export_status.insert("practice_events".to_string(), "failed".to_string());
                Vec::new()
            }
        };

        ExportDocument {
            exported_at: Utc::now(),
            user_id: user_id.map(String::from),
            remote,
            token_usage,
            local: LocalTables { practice_sessions, practice_events },
            export_status,
        }
    }

    /// Fetch one remote record kind, sanitized. Remote failures surface as
    /// [`Error::Http`] for the caller's per-kind status handling.
    async fn fetch_kind(&self, kind: &str, user_id: &str) -> Result<Vec<Value>> {
        let mut records = self
            .remote
            .query_by_owner(kind, user_id)
            .await
            .map_err(Error::from)?;

        for record in &mut records {
            sanitize_record(kind, record);
        }

        Ok(records)
    }
}

/// Strip secret material from one remote record.
///
/// API-key records are reduced to an explicit metadata whitelist; every other
/// kind gets a recursive blocklist sweep as a second line of defense.
fn sanitize_record(kind: &str, record: &mut Value) {
    if kind == "api_keys" {
        if let Value::Object(map) = record {
            map.retain(|key, _| API_KEY_METADATA_FIELDS.contains(&key.as_str()));
        }
    }
    strip_secret_fields(record);
}

fn strip_secret_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !is_secret_field(key));
            for child in map.values_mut() {
                strip_secret_fields(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_secret_fields(item);
            }
        }
        _ => {}
    }
}

fn is_secret_field(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.contains("secret")
        || key.contains("password")
        || key.contains("api_key")
        || key.contains("private")
        || key == "token"
        || key.ends_with("_token")
        || key.ends_with("credential")
        || key.ends_with("credentials")
}

fn aggregate_token_usage(records: &[Value]) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for record in records {
        let prompt = record.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0);
        let completion = record.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0);
        let total = record
            .get("total_tokens")
            .and_then(Value::as_i64)
            .unwrap_or(prompt + completion);

        usage.prompt_tokens += prompt;
        usage.completion_tokens += completion;
        usage.total_tokens += total;
    }
    usage
}
