//! Candidate selection for a sync pass.
//!
//! The store is the queue: anything Pending (and not permanently failed)
//! that belongs to a remote-linked reading is eligible. Ordering is stable
//! within a pass but carries no cross-record guarantee.

use crate::error::DatabaseError;
use crate::storage::{Database, HighlightRecord, SessionRecord};

/// One unit of work for the orchestrator.
#[derive(Debug, Clone)]
pub enum SyncCandidate {
    /// Push a finished session.
    Session {
        record: SessionRecord,
        reading_remote_id: String,
    },
    /// Push a highlight create.
    HighlightCreate {
        record: HighlightRecord,
        reading_remote_id: String,
    },
    /// Propagate a soft delete to the remote, then drop the row.
    HighlightDelete {
        record: HighlightRecord,
        remote_id: String,
    },
    /// Soft-deleted before it ever synced: drop the row, no remote call.
    HighlightDiscard { id: String },
}

/// Collect everything the next pass should attempt.
pub fn collect(db: &Database) -> Result<Vec<SyncCandidate>, DatabaseError> {
    let mut out = Vec::new();

    for (record, reading_remote_id) in db.pending_sessions()? {
        out.push(SyncCandidate::Session {
            record,
            reading_remote_id,
        });
    }

    for (record, reading_remote_id) in db.pending_highlights()? {
        out.push(SyncCandidate::HighlightCreate {
            record,
            reading_remote_id,
        });
    }

    for record in db.deleted_unsynced_highlights()? {
        out.push(SyncCandidate::HighlightDiscard { id: record.id });
    }

    for record in db.deleted_synced_highlights()? {
        if let Some(remote_id) = record.remote_id.clone() {
            out.push(SyncCandidate::HighlightDelete { record, remote_id });
        }
    }

    Ok(out)
}
