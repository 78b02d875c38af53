//! Local store models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Instrument input source for a session or event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    None,
    Midi,
    Audio,
}

impl InputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputSource::None => "none",
            InputSource::Midi => "midi",
            InputSource::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(InputSource::None),
            "midi" => Ok(InputSource::Midi),
            "audio" => Ok(InputSource::Audio),
            other => Err(Error::InvalidInput(format!("Unknown input source: {}", other))),
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session lifecycle status, written only by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(Error::InvalidInput(format!("Unknown session status: {}", other))),
        }
    }
}

/// Remote persistence status, written only by the migration engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {}", other))),
        }
    }
}

/// One continuous practice interval
///
/// Invariants: at most one row is `active` per store; `synced` rows carry a
/// remote id; `duration_ms == ended_at - started_at` once completed; the
/// remote id, once set, is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeSession {
    /// Local id, monotonic within this store
    pub id: i64,
    /// Assigned by the remote store on successful sync
    pub remote_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Derived; absent while active
    pub duration_ms: Option<i64>,
    pub source: InputSource,
    pub status: SessionStatus,
    pub sync_status: SyncStatus,
    /// Absent for guest-captured sessions until migrated
    pub user_id: Option<String>,
}

/// One discrete captured input occurrence, as delivered by the capture adapter.
///
/// Musical semantics are not validated here; events pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureEvent {
    /// Event kind, e.g. `note_on` / `note_off`
    pub kind: String,
    /// Note identifier (MIDI note number for midi sources)
    pub note: Option<i64>,
    /// Human-readable note name, e.g. "C4"
    pub note_name: Option<String>,
    /// Intensity / velocity
    pub velocity: Option<i64>,
    pub channel: Option<i64>,
    /// Source clock, monotonically non-decreasing within a session
    pub timestamp_ms: i64,
    pub source: InputSource,
}

impl CaptureEvent {
    /// True for the event kind that auto-starts a session
    pub fn is_note_activation(&self) -> bool {
        self.kind == "note_on"
    }
}

/// A stored event row, owned by exactly one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeEvent {
    pub id: i64,
    pub session_id: i64,
    pub kind: String,
    pub note: Option<i64>,
    pub note_name: Option<String>,
    pub velocity: Option<i64>,
    pub channel: Option<i64>,
    pub timestamp_ms: i64,
    pub source: InputSource,
    pub sync_status: SyncStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trips() {
        for s in [InputSource::None, InputSource::Midi, InputSource::Audio] {
            assert_eq!(InputSource::parse(s.as_str()).unwrap(), s);
        }
        for s in [SessionStatus::Active, SessionStatus::Completed] {
            assert_eq!(SessionStatus::parse(s.as_str()).unwrap(), s);
        }
        for s in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(SyncStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn test_unknown_enum_values_rejected() {
        assert!(InputSource::parse("theremin").is_err());
        assert!(SessionStatus::parse("paused").is_err());
        assert!(SyncStatus::parse("uploading").is_err());
    }

    #[test]
    fn test_note_activation() {
        let event = CaptureEvent {
            kind: "note_on".to_string(),
            note: Some(60),
            note_name: Some("C4".to_string()),
            velocity: Some(96),
            channel: Some(0),
            timestamp_ms: 0,
            source: InputSource::Midi,
        };
        assert!(event.is_note_activation());

        let off = CaptureEvent { kind: "note_off".to_string(), ..event };
        assert!(!off.is_note_activation());
    }
}
