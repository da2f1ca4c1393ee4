//! Push synchronization to the remote reading service.
//!
//! Local records are created Pending with an immutable idempotency key;
//! a sync pass pushes every eligible candidate, classifies each outcome
//! as accepted, permanently rejected, or transient, and transitions the
//! record's sync state accordingly. Pull-side reconciliation is out of
//! scope.

pub mod candidates;
pub mod client;
pub mod orchestrator;
pub mod types;

pub use candidates::SyncCandidate;
pub use client::{HttpSyncClient, RemoteSyncClient};
pub use orchestrator::SyncOrchestrator;
pub use types::{
    CancelToken, NullReporter, PushOutcome, RejectReason, SyncError, SyncReporter, SyncRunStatus,
    SyncedRecord,
};
