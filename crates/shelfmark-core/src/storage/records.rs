//! Row types shared by storage and sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-record push state.
///
/// Transitions only Pending -> Synced or Pending -> NeedsReconnect; the
/// store's writers refuse anything else, so the sequence observed for any
/// record is a prefix of `Pending, {Synced | NeedsReconnect}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Not yet pushed; eligible for the next pass.
    Pending,
    /// Accepted by the remote service.
    Synced,
    /// Permanently refused; excluded from automatic passes until an
    /// external action (re-authentication) resets it.
    NeedsReconnect,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::NeedsReconnect => "needs_reconnect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncState::Pending),
            "synced" => Some(SyncState::Synced),
            "needs_reconnect" => Some(SyncState::NeedsReconnect),
            _ => None,
        }
    }
}

/// Aggregate state of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingStatus {
    Reading,
    Finished,
    Abandoned,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::Reading => "reading",
            ReadingStatus::Finished => "finished",
            ReadingStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(ReadingStatus::Reading),
            "finished" => Some(ReadingStatus::Finished),
            "abandoned" => Some(ReadingStatus::Abandoned),
            _ => None,
        }
    }
}

/// A book the user is tracking.
///
/// `remote_id` is absent until the reading is linked to the remote
/// service; sessions and highlights of unlinked readings are never sync
/// candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub remote_id: Option<String>,
    pub status: ReadingStatus,
    pub progress_fraction: f64,
    pub created_at: DateTime<Utc>,
}

impl ReadingRecord {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            author: author.to_string(),
            remote_id: None,
            status: ReadingStatus::Reading,
            progress_fraction: 0.0,
            created_at: Utc::now(),
        }
    }
}

/// One finished reading session, produced from a finalized timer.
///
/// The idempotency key is assigned here, once, and never reassigned --
/// every retry of the push carries the same key, which is what lets the
/// remote service discard duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub idempotency_key: String,
    pub reading_id: String,
    pub duration_seconds: u64,
    pub progress_fraction: f64,
    pub occurred_at: DateTime<Utc>,
    pub sync_state: SyncState,
}

impl SessionRecord {
    pub fn new(
        reading_id: &str,
        duration_seconds: u64,
        progress_fraction: f64,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            reading_id: reading_id.to_string(),
            duration_seconds,
            progress_fraction,
            occurred_at,
            sync_state: SyncState::Pending,
        }
    }
}

/// A passage the user marked, with soft delete pending remote propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub id: String,
    pub idempotency_key: String,
    pub reading_id: String,
    pub content: String,
    pub position: String,
    pub occurred_at: DateTime<Utc>,
    pub sync_state: SyncState,
    pub remote_id: Option<String>,
    pub deleted_by_user: bool,
}

impl HighlightRecord {
    pub fn new(reading_id: &str, content: &str, position: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            reading_id: reading_id.to_string(),
            content: content.to_string(),
            position: position.to_string(),
            occurred_at: Utc::now(),
            sync_state: SyncState::Pending,
            remote_id: None,
            deleted_by_user: false,
        }
    }
}
