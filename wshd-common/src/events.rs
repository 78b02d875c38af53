//! Event types for the Woodshed event system
//!
//! Components never observe store changes to trigger side effects; they
//! publish discrete messages on the [`EventBus`] and a single dispatcher
//! routes them. Capture publishes `SessionStarted` / `EventRecorded` /
//! `SessionEnded`; the connectivity monitor publishes `Reconnected`; the
//! identity callback publishes `Authenticated` / `SignedOut`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Woodshed event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WshdEvent {
    /// A practice session was opened
    SessionStarted {
        session_id: i64,
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An input event was appended to the active session
    EventRecorded {
        session_id: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A practice session was completed (explicit end or inactivity timeout)
    SessionEnded {
        session_id: i64,
        duration_ms: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Offline → online edge observed by the connectivity monitor.
    /// Emitted exactly once per transition, never while already online.
    Reconnected {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Identity provider reported an authenticated user
    Authenticated {
        user_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Identity provider reported sign-out / session expiry
    SignedOut {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Migration state machine transitioned
    MigrationStatusChanged {
        status: MigrationStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl WshdEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            WshdEvent::SessionStarted { .. } => "SessionStarted",
            WshdEvent::EventRecorded { .. } => "EventRecorded",
            WshdEvent::SessionEnded { .. } => "SessionEnded",
            WshdEvent::Reconnected { .. } => "Reconnected",
            WshdEvent::Authenticated { .. } => "Authenticated",
            WshdEvent::SignedOut { .. } => "SignedOut",
            WshdEvent::MigrationStatusChanged { .. } => "MigrationStatusChanged",
        }
    }
}

/// Migration state machine: idle → migrating → (complete | partial-failure) → idle.
///
/// Not persisted across restarts; a restart with pending records simply
/// re-triggers migration on the next authenticated/reconnect edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// No migration running and no unreported outcome
    Idle,
    /// A run is in progress; progress is valid only in this state
    Migrating,
    /// Every eligible session reached synced
    Complete,
    /// Some sessions remained failed; retryable via the same trigger path
    PartialFailure { failed_ids: Vec<i64> },
}

impl MigrationStatus {
    /// Terminal states persist until dismissal or the next trigger
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationStatus::Complete | MigrationStatus::PartialFailure { .. }
        )
    }
}

/// Aggregate progress of the current migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Sessions synced so far in this run
    pub synced: usize,
    /// Total sessions eligible at the start of the run
    pub total: usize,
}

/// Broadcast bus shared by all components
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WshdEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WshdEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Send errors (no receivers) are ignored: publishing must never fail
    /// the publishing component.
    pub fn emit(&self, event: WshdEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No event subscribers: {}", e);
        }
    }
}
