//! Migration/sync engine
//!
//! Uploads locally pending sessions (and their events) to the remote store in
//! bounded batches. State machine:
//! idle → migrating → (complete | partial-failure) → idle.
//!
//! Per-session failures never abort the run; a scan-phase failure aborts it
//! and reports partial-failure rather than risking a false "complete".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use wshd_common::db::models::PracticeSession;
use wshd_common::db::{events, sessions};
use wshd_common::events::{EventBus, MigrationProgress, MigrationStatus, WshdEvent};

use crate::sync::remote::{RemoteClient, RemoteError};

/// Initial retry backoff for a failed upload; doubles per attempt
const UPLOAD_BACKOFF_INITIAL_MS: u64 = 100;
/// Backoff cap so a long retry chain stays bounded
const UPLOAD_BACKOFF_MAX_MS: u64 = 2_000;

/// Tuning knobs for one engine instance
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    /// Bounded upload concurrency per run
    pub batch_size: usize,
    /// Attempts per session before it is marked failed
    pub max_retries: u32,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self { batch_size: 4, max_retries: 3 }
    }
}

/// The migration/sync engine
#[derive(Clone)]
pub struct MigrationEngine {
    inner: Arc<Inner>,
}

struct Inner {
    db: SqlitePool,
    remote: Arc<RemoteClient>,
    event_bus: EventBus,
    options: MigrationOptions,
    status: RwLock<MigrationStatus>,
    progress: RwLock<MigrationProgress>,
    current_user: RwLock<Option<String>>,
}

impl MigrationEngine {
    pub fn new(
        db: SqlitePool,
        remote: Arc<RemoteClient>,
        event_bus: EventBus,
        options: MigrationOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                remote,
                event_bus,
                options,
                status: RwLock::new(MigrationStatus::Idle),
                progress: RwLock::new(MigrationProgress::default()),
                current_user: RwLock::new(None),
            }),
        }
    }

    /// Identity provider callback. Transitioning to authenticated triggers
    /// one migration run.
    pub async fn set_identity(&self, user_id: Option<String>) -> MigrationStatus {
        let became_authenticated = {
            let mut current = self.inner.current_user.write().await;
            let was_anonymous = current.is_none();
            *current = user_id.clone();
            was_anonymous && user_id.is_some()
        };

        if became_authenticated {
            info!(user_id = user_id.as_deref().unwrap_or(""), "Identity established, triggering migration");
            self.trigger().await
        } else {
            self.status().await
        }
    }

    /// Connectivity reconnect edge. Only meaningful while authenticated.
    pub async fn on_reconnected(&self) -> MigrationStatus {
        if self.inner.current_user.read().await.is_none() {
            debug!("Reconnected while anonymous, nothing to migrate");
            return self.status().await;
        }
        info!("Reconnected while authenticated, triggering migration");
        self.trigger().await
    }

    /// Run one migration cycle to completion. A trigger while already
    /// migrating is ignored (no overlapping runs).
    pub async fn trigger(&self) -> MigrationStatus {
        let Some(user_id) = self.inner.current_user.read().await.clone() else {
            debug!("Migration trigger ignored: no authenticated user");
            return self.status().await;
        };

        // Claim the run under the write lock, or bail if one is in flight
        {
            let mut status = self.inner.status.write().await;
            if *status == MigrationStatus::Migrating {
                debug!("Migration already running, trigger ignored");
                return status.clone();
            }
            *status = MigrationStatus::Migrating;
        }

        let outcome = self.run(&user_id).await;
        self.transition(outcome.clone()).await;
        outcome
    }

    async fn run(&self, user_id: &str) -> MigrationStatus {
        // Scan phase: a local store failure here aborts the whole attempt and
        // conservatively reports partial-failure with the last known total.
        let eligible = match sessions::eligible_for_sync(&self.inner.db, user_id).await {
            Ok(eligible) => eligible,
            Err(e) => {
                warn!(error = %e, "Migration scan failed, aborting run");
                return MigrationStatus::PartialFailure { failed_ids: Vec::new() };
            }
        };

        if eligible.is_empty() {
            debug!("No pending sessions, migration stays idle");
            return MigrationStatus::Idle;
        }

        let total = eligible.len();
        *self.inner.progress.write().await = MigrationProgress { synced: 0, total };
        info!(total, "Migration run started");

        // Bounded concurrency: sessions are independent, so no cross-session
        // ordering is required, but each session's events travel with it.
        let results: Vec<(i64, bool)> = stream::iter(eligible)
            .map(|session| {
                let engine = self.clone();
                let user_id = user_id.to_string();
                async move {
                    let id = session.id;
                    let ok = engine.upload_one(session, &user_id).await;
                    (id, ok)
                }
            })
            .buffer_unordered(self.inner.options.batch_size)
            .collect()
            .await;

        let mut failed_ids: Vec<i64> = results
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(id, _)| *id)
            .collect();
        failed_ids.sort_unstable();

        if failed_ids.is_empty() {
            info!(total, "Migration complete");
            MigrationStatus::Complete
        } else {
            warn!(failed = failed_ids.len(), total, "Migration finished with failures");
            MigrationStatus::PartialFailure { failed_ids }
        }
    }

    /// Upload one session as a unit. Returns true on success; failures mark
    /// the session `failed` and leave the rest of the batch running.
    async fn upload_one(&self, session: PracticeSession, user_id: &str) -> bool {
        let session_events = match events::events_for_session(&self.inner.db, session.id).await {
            Ok(events) => events,
            Err(e) => {
                warn!(session_id = session.id, error = %e, "Failed to read events for upload");
                let _ = sessions::mark_failed(&self.inner.db, session.id).await;
                return false;
            }
        };

        let mut backoff_ms = UPLOAD_BACKOFF_INITIAL_MS;
        let mut last_error: Option<RemoteError> = None;

        for attempt in 1..=self.inner.options.max_retries {
            match self
                .inner
                .remote
                .upload_session(&session, &session_events, user_id)
                .await
            {
                Ok(remote_id) => {
                    if let Err(e) =
                        sessions::mark_synced(&self.inner.db, session.id, remote_id, user_id).await
                    {
                        // Uploaded but not recorded locally: keep it failed so
                        // the next run retries with the remote's dedup.
                        warn!(session_id = session.id, error = %e, "Failed to record sync status");
                        let _ = sessions::mark_failed(&self.inner.db, session.id).await;
                        return false;
                    }

                    self.inner.progress.write().await.synced += 1;
                    debug!(session_id = session.id, %remote_id, "Session synced");
                    return true;
                }
                Err(e) => {
                    debug!(
                        session_id = session.id,
                        attempt,
                        error = %e,
                        "Upload attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.inner.options.max_retries {
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms * 2).min(UPLOAD_BACKOFF_MAX_MS);
                    }
                }
            }
        }

        warn!(
            session_id = session.id,
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "Session upload failed after retries"
        );
        let _ = sessions::mark_failed(&self.inner.db, session.id).await;
        false
    }

    /// Dismissal resets a terminal outcome back to idle
    pub async fn dismiss(&self) -> MigrationStatus {
        let mut status = self.inner.status.write().await;
        if status.is_terminal() {
            *status = MigrationStatus::Idle;
            self.inner.event_bus.emit(WshdEvent::MigrationStatusChanged {
                status: MigrationStatus::Idle,
                timestamp: Utc::now(),
            });
        }
        status.clone()
    }

    pub async fn status(&self) -> MigrationStatus {
        self.inner.status.read().await.clone()
    }

    /// Progress of the current run; meaningful only while migrating
    pub async fn progress(&self) -> MigrationProgress {
        *self.inner.progress.read().await
    }

    pub async fn current_user(&self) -> Option<String> {
        self.inner.current_user.read().await.clone()
    }

    async fn transition(&self, new_status: MigrationStatus) {
        *self.inner.status.write().await = new_status.clone();
        self.inner.event_bus.emit(WshdEvent::MigrationStatusChanged {
            status: new_status,
            timestamp: Utc::now(),
        });
    }
}
