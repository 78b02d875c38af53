//! Practice event queries
//!
//! Events are append-only: inserted in arrival order, never reordered or
//! mutated after insertion (the migration engine flips `sync_status` only).

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::db::models::{CaptureEvent, InputSource, PracticeEvent, SyncStatus};
use crate::Result;

fn event_from_row(row: &SqliteRow) -> Result<PracticeEvent> {
    let source: String = row.get("source");
    let sync_status: String = row.get("sync_status");

    Ok(PracticeEvent {
        id: row.get("id"),
        session_id: row.get("session_id"),
        kind: row.get("kind"),
        note: row.get("note"),
        note_name: row.get("note_name"),
        velocity: row.get("velocity"),
        channel: row.get("channel"),
        timestamp_ms: row.get("timestamp_ms"),
        source: InputSource::parse(&source)?,
        sync_status: SyncStatus::parse(&sync_status)?,
    })
}

/// Append one event row tied to a session
pub async fn insert_event(
    pool: &SqlitePool,
    session_id: i64,
    event: &CaptureEvent,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO practice_events
            (session_id, kind, note, note_name, velocity, channel, timestamp_ms, source, sync_status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(session_id)
    .bind(&event.kind)
    .bind(event.note)
    .bind(&event.note_name)
    .bind(event.velocity)
    .bind(event.channel)
    .bind(event.timestamp_ms)
    .bind(event.source.as_str())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// All events for one session in strict timestamp order.
///
/// Insertion id breaks ties so same-timestamp events keep arrival order.
pub async fn events_for_session(
    pool: &SqlitePool,
    session_id: i64,
) -> Result<Vec<PracticeEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, kind, note, note_name, velocity, channel,
               timestamp_ms, source, sync_status
        FROM practice_events
        WHERE session_id = ?
        ORDER BY timestamp_ms ASC, id ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// All events across all sessions, in insertion order (export)
pub async fn all_events(pool: &SqlitePool) -> Result<Vec<PracticeEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, kind, note, note_name, velocity, channel,
               timestamp_ms, source, sync_status
        FROM practice_events
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Count events owned by one session
pub async fn event_count(pool: &SqlitePool, session_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM practice_events WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}
