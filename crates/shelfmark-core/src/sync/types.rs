//! Core types for remote synchronization.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DatabaseError;
use crate::storage::{HighlightRecord, SessionRecord};

/// Why the remote service permanently refused a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The parent entity no longer exists remotely.
    Gone,
    /// The caller's credentials are no longer valid.
    Unauthorized,
}

/// Classified result of a single remote call.
///
/// The permanent-vs-transient decision is made in exactly one place (the
/// client's status classifier); everything downstream only matches on
/// this enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote accepted the record (or had already accepted the same
    /// idempotency key -- indistinguishable on purpose).
    Accepted { remote_id: Option<String> },
    /// Permanent refusal; retrying can never succeed.
    Rejected(RejectReason),
    /// Network or server trouble; the record stays eligible for the next
    /// pass.
    Transient(String),
}

/// Terminal status of one sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// Every candidate was attempted; none moved to NeedsReconnect.
    Completed,
    /// At least one record moved to NeedsReconnect ("sign in again").
    CompletedWithReconnectNeeded,
    /// Connectivity was unavailable at the start; nothing attempted.
    SkippedNoNetwork,
    /// Another pass was in flight; this call was rejected, not queued.
    AlreadyRunning,
}

/// A record whose sync state just changed, for reporter delivery.
#[derive(Debug, Clone)]
pub enum SyncedRecord {
    Session(SessionRecord),
    Highlight(HighlightRecord),
}

/// Callback surface toward whatever owns the UI. No threading promise is
/// made beyond "not necessarily the caller's thread".
pub trait SyncReporter: Send + Sync {
    fn record_updated(&self, _record: &SyncedRecord) {}
    fn record_deleted(&self, _id: &str) {}
    fn pass_complete(&self, _status: SyncRunStatus) {}
}

/// Reporter that drops everything.
pub struct NullReporter;

impl SyncReporter for NullReporter {}

/// Cooperative flag checked before delivering reporter notifications.
///
/// A cancelled pass still runs to completion and applies its results to
/// the store; only the notifications are dropped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Sync error types.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
