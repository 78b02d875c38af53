//! Session lifecycle manager
//!
//! Owns the single process-wide "active session" pointer and the inactivity
//! debounce timer. No other component transitions a session's `status`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use wshd_common::db::models::{CaptureEvent, InputSource};
use wshd_common::db::{events, sessions};
use wshd_common::events::{EventBus, WshdEvent};
use wshd_common::Result;

/// Opens and closes practice sessions and appends their events.
///
/// Clone-cheap: all state is behind `Arc`s so the debounce timer task can
/// hold its own handle.
#[derive(Clone)]
pub struct LifecycleManager {
    db: SqlitePool,
    event_bus: EventBus,
    inactivity_timeout: Duration,
    /// The one shared active-session pointer. The async mutex also serializes
    /// auto-start attempts so rapid events collapse into one session.
    active: Arc<Mutex<Option<i64>>>,
    /// Debounce timer generation. Arming bumps it; a sleeping timer task only
    /// fires if its generation is still current.
    timer_generation: Arc<AtomicU64>,
}

impl LifecycleManager {
    pub fn new(db: SqlitePool, event_bus: EventBus, inactivity_timeout: Duration) -> Self {
        Self {
            db,
            event_bus,
            inactivity_timeout,
            active: Arc::new(Mutex::new(None)),
            timer_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a session, or return the already-active one unchanged.
    ///
    /// Idempotent: repeated starts never create duplicate sessions.
    pub async fn start_session(&self, source: InputSource) -> Result<i64> {
        let mut active = self.active.lock().await;
        self.start_session_locked(&mut active, source).await
    }

    async fn start_session_locked(
        &self,
        active: &mut Option<i64>,
        source: InputSource,
    ) -> Result<i64> {
        if let Some(id) = *active {
            debug!(session_id = id, "Session already active, reusing");
            self.arm_timer(id);
            return Ok(id);
        }

        let started_at = Utc::now();
        let id = sessions::insert_session(&self.db, source, started_at).await?;
        *active = Some(id);
        self.arm_timer(id);

        info!(session_id = id, source = %source, "Practice session started");
        self.event_bus.emit(WshdEvent::SessionStarted {
            session_id: id,
            source: source.as_str().to_string(),
            timestamp: started_at,
        });

        Ok(id)
    }

    /// Append one event to a session and reset the inactivity timer.
    ///
    /// Storage errors are logged, never returned: recording must not crash
    /// the capture path.
    pub async fn record_event(&self, session_id: i64, event: &CaptureEvent) {
        match events::insert_event(&self.db, session_id, event).await {
            Ok(_) => {
                self.arm_timer(session_id);
                self.event_bus.emit(WshdEvent::EventRecorded {
                    session_id,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(session_id, error = %e, "Failed to record practice event");
            }
        }
    }

    /// Capture-adapter entry point with the auto-start policy: a note
    /// activation with no active session opens one from the event's source,
    /// then the event is recorded. Returns the session the event landed in,
    /// or `None` when there was nothing to record into.
    pub async fn capture(&self, event: CaptureEvent) -> Option<i64> {
        let session_id = {
            let mut active = self.active.lock().await;
            match *active {
                Some(id) => id,
                None => {
                    if !event.is_note_activation() {
                        debug!(kind = %event.kind, "Dropping event with no active session");
                        return None;
                    }
                    match self.start_session_locked(&mut active, event.source).await {
                        Ok(id) => id,
                        Err(e) => {
                            warn!(error = %e, "Failed to auto-start session");
                            return None;
                        }
                    }
                }
            }
        };

        self.record_event(session_id, &event).await;
        Some(session_id)
    }

    /// End a session. Idempotent: completed or unknown sessions are a no-op.
    pub async fn end_session(&self, session_id: i64) -> Result<()> {
        let Some(session) = sessions::get_session(&self.db, session_id).await? else {
            debug!(session_id, "end_session on unknown session, ignoring");
            return Ok(());
        };

        let ended_at = Utc::now();
        let duration_ms = (ended_at - session.started_at).num_milliseconds().max(0);

        if !sessions::complete_session(&self.db, session_id, ended_at, duration_ms).await? {
            debug!(session_id, "Session already completed");
            return Ok(());
        }

        {
            let mut active = self.active.lock().await;
            if *active == Some(session_id) {
                *active = None;
                // Invalidate any pending debounce timer for this session
                self.timer_generation.fetch_add(1, Ordering::SeqCst);
            }
        }

        info!(session_id, duration_ms, "Practice session ended");
        self.event_bus.emit(WshdEvent::SessionEnded {
            session_id,
            duration_ms,
            timestamp: ended_at,
        });

        Ok(())
    }

    /// Currently active session id, if any
    pub async fn active_session_id(&self) -> Option<i64> {
        *self.active.lock().await
    }

    /// Cancel-and-reschedule single-shot inactivity timer.
    ///
    /// Every qualifying call bumps the generation, so an older sleeping task
    /// wakes up stale and does nothing: a debounce, not a fixed-interval check.
    fn arm_timer(&self, session_id: i64) {
        let generation = self.timer_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let manager = self.clone();
        let timeout = self.inactivity_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if manager.timer_generation.load(Ordering::SeqCst) != generation {
                return; // reset or cancelled in the meantime
            }
            debug!(session_id, "Inactivity timeout expired");
            if let Err(e) = manager.end_session(session_id).await {
                warn!(session_id, error = %e, "Failed to end session on inactivity timeout");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wshd_common::db::init_database;
    use wshd_common::db::models::SessionStatus;

    async fn manager(timeout_ms: u64) -> (tempfile::TempDir, LifecycleManager) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("test.db")).await.unwrap();
        let manager = LifecycleManager::new(
            pool,
            EventBus::new(64),
            Duration::from_millis(timeout_ms),
        );
        (dir, manager)
    }

    fn note_on(timestamp_ms: i64) -> CaptureEvent {
        CaptureEvent {
            kind: "note_on".to_string(),
            note: Some(60),
            note_name: Some("C4".to_string()),
            velocity: Some(100),
            channel: Some(0),
            timestamp_ms,
            source: InputSource::Midi,
        }
    }

    #[tokio::test]
    async fn test_start_session_idempotent() {
        let (_dir, manager) = manager(60_000).await;

        let first = manager.start_session(InputSource::Midi).await.unwrap();
        let second = manager.start_session(InputSource::Midi).await.unwrap();
        let third = manager.start_session(InputSource::Audio).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[tokio::test]
    async fn test_concurrent_auto_start_collapses_to_one_session() {
        let (_dir, manager) = manager(60_000).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let m = manager.clone();
            handles.push(tokio::spawn(async move { m.capture(note_on(i)).await }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "Concurrent captures must share one session");
    }

    #[tokio::test]
    async fn test_non_activation_event_without_session_is_dropped() {
        let (_dir, manager) = manager(60_000).await;

        let mut event = note_on(0);
        event.kind = "note_off".to_string();

        assert!(manager.capture(event).await.is_none());
        assert!(manager.active_session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_inactivity_timeout_ends_session() {
        let (_dir, manager) = manager(100).await;

        let id = manager.capture(note_on(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let session = sessions::get_session(manager_db(&manager), id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.duration_ms.is_some());
        assert!(manager.active_session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_event_resets_inactivity_timer() {
        let (_dir, manager) = manager(200).await;

        let id = manager.capture(note_on(0)).await.unwrap();

        // Keep feeding events faster than the timeout
        for i in 1..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            manager.record_event(id, &note_on(i * 100)).await;
        }

        let session = sessions::get_session(manager_db(&manager), id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active, "Debounce must prevent false timeout");

        // Now go quiet and let it expire
        tokio::time::sleep(Duration::from_millis(500)).await;
        let session = sessions::get_session(manager_db(&manager), id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_end_session_idempotent() {
        let (_dir, manager) = manager(60_000).await;

        let id = manager.start_session(InputSource::Midi).await.unwrap();
        manager.end_session(id).await.unwrap();
        manager.end_session(id).await.unwrap(); // already completed: no-op
        manager.end_session(9999).await.unwrap(); // unknown: no-op
    }

    fn manager_db(manager: &LifecycleManager) -> &SqlitePool {
        &manager.db
    }
}
