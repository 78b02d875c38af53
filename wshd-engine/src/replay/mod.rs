//! Replay loader with deletion detection
//!
//! Loads a session plus its events for playback, then periodically
//! re-verifies that the record still exists in its backing store while the
//! load is live. A record that disappears mid-read yields the distinct `Deleted`
//! state, never a generic "not found": the user was mid-interaction and the
//! remediation differs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wshd_common::db::models::{PracticeEvent, PracticeSession};
use wshd_common::db::{events, sessions};

use crate::sync::remote::RemoteClient;

/// Replay error categories; each carries a distinct user-facing message
/// because the corrective action differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayErrorKind {
    /// The requested session does not exist (or was removed before the load)
    NotFound,
    /// The local history is empty; nothing to replay
    NoHistory,
    /// Generic load failure; worth retrying
    LoadFailed,
}

impl ReplayErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ReplayErrorKind::NotFound => "Session not found. It may have been removed.",
            ReplayErrorKind::NoHistory => "No practice sessions recorded yet.",
            ReplayErrorKind::LoadFailed => "Could not load the session. Please try again.",
        }
    }
}

/// Loader state machine: idle → loading → (success | error | deleted)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplayState {
    Idle,
    Loading,
    Success {
        session: PracticeSession,
        /// Ordered by timestamp
        events: Vec<PracticeEvent>,
    },
    /// The backing record vanished while the read was live; playback paused
    Deleted {
        session_id: i64,
        message: String,
    },
    Error {
        kind: ReplayErrorKind,
        message: String,
    },
}

#[derive(Clone)]
pub struct ReplayService {
    inner: Arc<Inner>,
}

struct Inner {
    db: SqlitePool,
    remote: Arc<RemoteClient>,
    poll_interval: Duration,
    state: RwLock<ReplayState>,
    /// Token of the running deletion poller, if any
    poll_token: Mutex<Option<CancellationToken>>,
}

impl ReplayService {
    pub fn new(db: SqlitePool, remote: Arc<RemoteClient>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                remote,
                poll_interval,
                state: RwLock::new(ReplayState::Idle),
                poll_token: Mutex::new(None),
            }),
        }
    }

    /// Load a session for replay. With no id, loads the most recently
    /// completed session. A new load cancels any previous deletion poller.
    pub async fn load(&self, session_id: Option<i64>) -> ReplayState {
        self.stop_polling().await;
        *self.inner.state.write().await = ReplayState::Loading;

        let session = match session_id {
            Some(id) => match sessions::get_session(&self.inner.db, id).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    return self.fail(ReplayErrorKind::NotFound).await;
                }
                Err(e) => {
                    warn!(session_id = id, error = %e, "Replay load failed");
                    return self.fail(ReplayErrorKind::LoadFailed).await;
                }
            },
            None => match sessions::latest_completed(&self.inner.db).await {
                Ok(Some(session)) => session,
                Ok(None) => {
                    return self.fail(ReplayErrorKind::NoHistory).await;
                }
                Err(e) => {
                    warn!(error = %e, "Replay load failed");
                    return self.fail(ReplayErrorKind::LoadFailed).await;
                }
            },
        };

        let session_events = match events::events_for_session(&self.inner.db, session.id).await {
            Ok(events) => events,
            Err(e) => {
                warn!(session_id = session.id, error = %e, "Failed to load replay events");
                return self.fail(ReplayErrorKind::LoadFailed).await;
            }
        };

        info!(session_id = session.id, events = session_events.len(), "Replay loaded");
        let state = ReplayState::Success { session: session.clone(), events: session_events };
        *self.inner.state.write().await = state.clone();

        self.start_polling(session).await;
        state
    }

    /// Stop polling and return to idle (consuming view unmounted)
    pub async fn unload(&self) {
        self.stop_polling().await;
        *self.inner.state.write().await = ReplayState::Idle;
    }

    pub async fn state(&self) -> ReplayState {
        self.inner.state.read().await.clone()
    }

    async fn fail(&self, kind: ReplayErrorKind) -> ReplayState {
        let state = ReplayState::Error {
            message: kind.user_message().to_string(),
            kind,
        };
        *self.inner.state.write().await = state.clone();
        state
    }

    /// Periodic existence re-verification for the loaded session.
    ///
    /// Synced sessions are checked against the remote store; guest sessions
    /// against the local row. Polling stops itself once deletion is observed.
    async fn start_polling(&self, session: PracticeSession) {
        let token = CancellationToken::new();
        *self.inner.poll_token.lock().await = Some(token.clone());

        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.inner.poll_interval);
            interval.tick().await; // first tick completes immediately
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(session_id = session.id, "Deletion poller stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        match service.still_exists(&session).await {
                            Some(true) => {}
                            Some(false) => {
                                // The check may have been in flight when a new
                                // load cancelled this poller
                                if !token.is_cancelled() {
                                    service.mark_deleted(session.id).await;
                                }
                                break;
                            }
                            // Probe failure is not deletion; keep polling
                            None => {}
                        }
                    }
                }
            }
        });
    }

    /// `Some(false)` means the backing record is gone; `None` means the
    /// check itself failed and is inconclusive.
    async fn still_exists(&self, session: &PracticeSession) -> Option<bool> {
        if let Some(remote_id) = session.remote_id {
            match self.inner.remote.session_exists(remote_id).await {
                Ok(exists) => Some(exists),
                Err(e) => {
                    debug!(session_id = session.id, error = %e, "Deletion poll inconclusive");
                    None
                }
            }
        } else {
            match sessions::get_session(&self.inner.db, session.id).await {
                Ok(row) => Some(row.is_some()),
                Err(e) => {
                    debug!(session_id = session.id, error = %e, "Deletion poll inconclusive");
                    None
                }
            }
        }
    }

    async fn mark_deleted(&self, session_id: i64) {
        let mut state = self.inner.state.write().await;
        // Only a live successful read of the same session can transition to
        // deleted; a stale check must never touch a newer load
        if matches!(&*state, ReplayState::Success { session, .. } if session.id == session_id) {
            info!(session_id, "Loaded session was deleted in its backing store");
            *state = ReplayState::Deleted {
                session_id,
                message: "This session was deleted while you were viewing it.".to_string(),
            };
        }
    }

    async fn stop_polling(&self) {
        if let Some(token) = self.inner.poll_token.lock().await.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_distinct() {
        let messages = [
            ReplayErrorKind::NotFound.user_message(),
            ReplayErrorKind::NoHistory.user_message(),
            ReplayErrorKind::LoadFailed.user_message(),
        ];
        for (i, a) in messages.iter().enumerate() {
            for b in messages.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
