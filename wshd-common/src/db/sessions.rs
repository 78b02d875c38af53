//! Practice session queries

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::{InputSource, PracticeSession, SessionStatus, SyncStatus};
use crate::{Error, Result};

const SESSION_COLUMNS: &str =
    "id, remote_id, started_at, ended_at, duration_ms, source, status, sync_status, user_id";

fn session_from_row(row: &SqliteRow) -> Result<PracticeSession> {
    let remote_id: Option<String> = row.get("remote_id");
    let remote_id = remote_id
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse remote_id: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = parse_timestamp(&started_at, "started_at")?;

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| parse_timestamp(&s, "ended_at"))
        .transpose()?;

    let source: String = row.get("source");
    let status: String = row.get("status");
    let sync_status: String = row.get("sync_status");

    Ok(PracticeSession {
        id: row.get("id"),
        remote_id,
        started_at,
        ended_at,
        duration_ms: row.get("duration_ms"),
        source: InputSource::parse(&source)?,
        status: SessionStatus::parse(&status)?,
        sync_status: SyncStatus::parse(&sync_status)?,
        user_id: row.get("user_id"),
    })
}

fn parse_timestamp(s: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", field, e)))
}

/// Insert a new active session and return its local id
pub async fn insert_session(
    pool: &SqlitePool,
    source: InputSource,
    started_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO practice_sessions (started_at, source, status, sync_status)
        VALUES (?, ?, 'active', 'pending')
        "#,
    )
    .bind(started_at.to_rfc3339())
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Load one session by local id
pub async fn get_session(pool: &SqlitePool, id: i64) -> Result<Option<PracticeSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM practice_sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Load the currently active session, if any
pub async fn active_session(pool: &SqlitePool) -> Result<Option<PracticeSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM practice_sessions WHERE status = 'active' ORDER BY id DESC LIMIT 1",
        SESSION_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Complete a session: set ended_at, derived duration and completed status.
///
/// Idempotent at the SQL level; only active rows are updated.
pub async fn complete_session(
    pool: &SqlitePool,
    id: i64,
    ended_at: DateTime<Utc>,
    duration_ms: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE practice_sessions
        SET ended_at = ?, duration_ms = ?, status = 'completed'
        WHERE id = ? AND status = 'active'
        "#,
    )
    .bind(ended_at.to_rfc3339())
    .bind(duration_ms)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load the most recently completed session
pub async fn latest_completed(pool: &SqlitePool) -> Result<Option<PracticeSession>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM practice_sessions WHERE status = 'completed' ORDER BY ended_at DESC, id DESC LIMIT 1",
        SESSION_COLUMNS
    ))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Sessions eligible for migration: pending or failed, owned by nobody (guest
/// capture) or by the given user.
pub async fn eligible_for_sync(
    pool: &SqlitePool,
    user_id: &str,
) -> Result<Vec<PracticeSession>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM practice_sessions
        WHERE status = 'completed'
          AND sync_status IN ('pending', 'failed')
          AND (user_id IS NULL OR user_id = ?)
        ORDER BY id ASC
        "#,
        SESSION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Record a successful upload: assign the remote id, claim ownership and mark
/// the session (and its events) synced.
///
/// A remote id already present is left untouched; it is immutable once set.
pub async fn mark_synced(
    pool: &SqlitePool,
    id: i64,
    remote_id: Uuid,
    user_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE practice_sessions
        SET remote_id = COALESCE(remote_id, ?), sync_status = 'synced', user_id = ?
        WHERE id = ?
        "#,
    )
    .bind(remote_id.to_string())
    .bind(user_id)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE practice_events SET sync_status = 'synced' WHERE session_id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Record a failed upload attempt; the session stays eligible for retry
pub async fn mark_failed(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("UPDATE practice_sessions SET sync_status = 'failed' WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Count completed sessions (drives the export compression decision)
pub async fn completed_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM practice_sessions WHERE status = 'completed'")
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// All sessions, oldest first (export)
pub async fn all_sessions(pool: &SqlitePool) -> Result<Vec<PracticeSession>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM practice_sessions ORDER BY id ASC",
        SESSION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.iter().map(session_from_row).collect()
}

/// Close sessions left active by a previous run.
///
/// The debounce timer dies with the process, so an `active` row at startup
/// will never be ended by a timeout. Complete it using its last event
/// timestamp when one exists, otherwise its start time.
pub async fn close_stale_sessions(pool: &SqlitePool) -> Result<usize> {
    let stale = sqlx::query(&format!(
        "SELECT {} FROM practice_sessions WHERE status = 'active'",
        SESSION_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let mut closed = 0usize;
    for row in &stale {
        let session = session_from_row(row)?;

        let last_event_ms: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(timestamp_ms) FROM practice_events WHERE session_id = ?",
        )
        .bind(session.id)
        .fetch_one(pool)
        .await?;

        let ended_at = match last_event_ms {
            Some(ms) if ms > session.started_at.timestamp_millis() => {
                DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(session.started_at)
            }
            _ => session.started_at,
        };
        let duration_ms = (ended_at - session.started_at).num_milliseconds().max(0);

        if complete_session(pool, session.id, ended_at, duration_ms).await? {
            tracing::info!(session_id = session.id, "Closed stale session from previous run");
            closed += 1;
        }
    }

    Ok(closed)
}
