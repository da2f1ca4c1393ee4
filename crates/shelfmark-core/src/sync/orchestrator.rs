//! The sync pass itself.
//!
//! One pass: check connectivity once, collect candidates, attempt every
//! one of them sequentially, classify each outcome, and report a terminal
//! status. A failure in one candidate never aborts the batch.
//!
//! At most one pass runs per process. The guard is an atomic flag, not a
//! lock: a concurrent `run` is rejected immediately with
//! [`SyncRunStatus::AlreadyRunning`] rather than queued or blocked.
//!
//! Crash safety rests on the idempotency key: if the process dies between
//! "remote call succeeded" and "local state marked Synced", the next pass
//! re-sends the same key and the remote treats it as a no-op. Retrying a
//! pass can never create a second remote record for the same local
//! session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::candidates::{self, SyncCandidate};
use super::client::RemoteSyncClient;
use super::types::{
    CancelToken, PushOutcome, SyncError, SyncReporter, SyncRunStatus, SyncedRecord,
};
use crate::error::DatabaseError;
use crate::storage::{Database, SyncState};

/// Drives sync passes against a remote client.
#[derive(Clone)]
pub struct SyncOrchestrator {
    client: Arc<dyn RemoteSyncClient>,
    in_flight: Arc<AtomicBool>,
}

impl SyncOrchestrator {
    pub fn new(client: Arc<dyn RemoteSyncClient>) -> Self {
        Self {
            client,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run one sync pass.
    ///
    /// Returns the terminal status; also delivers it to the reporter
    /// unless the token was cancelled. `Err` is only possible while
    /// collecting candidates -- per-candidate trouble is contained.
    pub fn run(
        &self,
        db: &Database,
        reporter: &dyn SyncReporter,
        cancel: &CancelToken,
    ) -> Result<SyncRunStatus, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("sync pass already in flight; rejecting");
            return Ok(SyncRunStatus::AlreadyRunning);
        }

        let result = self.run_pass(db, reporter, cancel);
        self.in_flight.store(false, Ordering::SeqCst);

        if let Ok(status) = &result {
            if !cancel.is_cancelled() {
                reporter.pass_complete(*status);
            }
        }
        result
    }

    fn run_pass(
        &self,
        db: &Database,
        reporter: &dyn SyncReporter,
        cancel: &CancelToken,
    ) -> Result<SyncRunStatus, SyncError> {
        // Checked once, not per record, to avoid a storm of failing calls.
        if !self.client.check_connectivity() {
            info!("remote unreachable; skipping sync pass");
            return Ok(SyncRunStatus::SkippedNoNetwork);
        }

        let candidates = candidates::collect(db)?;
        debug!(count = candidates.len(), "sync pass starting");

        let mut reconnect_needed = false;
        for candidate in candidates {
            match candidate {
                SyncCandidate::Session {
                    record,
                    reading_remote_id,
                } => {
                    let outcome = self.client.create_session_ping(
                        &record.idempotency_key,
                        &reading_remote_id,
                        record.progress_fraction,
                        record.duration_seconds,
                        record.occurred_at,
                    );
                    match outcome {
                        PushOutcome::Accepted { .. } => {
                            if applied(db.mark_session_synced(&record.id), &record.id) {
                                let mut updated = record;
                                updated.sync_state = SyncState::Synced;
                                notify_updated(reporter, cancel, SyncedRecord::Session(updated));
                            }
                        }
                        PushOutcome::Rejected(reason) => {
                            warn!(id = %record.id, ?reason, "session push permanently rejected");
                            if applied(db.mark_session_needs_reconnect(&record.id), &record.id) {
                                reconnect_needed = true;
                                let mut updated = record;
                                updated.sync_state = SyncState::NeedsReconnect;
                                notify_updated(reporter, cancel, SyncedRecord::Session(updated));
                            }
                        }
                        PushOutcome::Transient(msg) => {
                            warn!(id = %record.id, error = %msg, "session push failed; will retry next pass");
                        }
                    }
                }

                SyncCandidate::HighlightCreate {
                    record,
                    reading_remote_id,
                } => {
                    let outcome = self.client.create_highlight(
                        &record.idempotency_key,
                        &reading_remote_id,
                        &record.content,
                        &record.position,
                        record.occurred_at,
                    );
                    match outcome {
                        PushOutcome::Accepted { remote_id } => {
                            if applied(
                                db.mark_highlight_synced(&record.id, remote_id.as_deref()),
                                &record.id,
                            ) {
                                let mut updated = record;
                                updated.sync_state = SyncState::Synced;
                                updated.remote_id = remote_id;
                                notify_updated(reporter, cancel, SyncedRecord::Highlight(updated));
                            }
                        }
                        PushOutcome::Rejected(reason) => {
                            warn!(id = %record.id, ?reason, "highlight push permanently rejected");
                            if applied(db.mark_highlight_needs_reconnect(&record.id), &record.id) {
                                reconnect_needed = true;
                                let mut updated = record;
                                updated.sync_state = SyncState::NeedsReconnect;
                                notify_updated(reporter, cancel, SyncedRecord::Highlight(updated));
                            }
                        }
                        PushOutcome::Transient(msg) => {
                            warn!(id = %record.id, error = %msg, "highlight push failed; will retry next pass");
                        }
                    }
                }

                SyncCandidate::HighlightDelete { record, remote_id } => {
                    match self.client.delete_highlight(&remote_id) {
                        PushOutcome::Accepted { .. } => {
                            if let Err(e) = db.delete_highlight(&record.id) {
                                warn!(id = %record.id, error = %e, "failed to drop deleted highlight");
                            } else {
                                notify_deleted(reporter, cancel, &record.id);
                            }
                        }
                        PushOutcome::Rejected(reason) => {
                            warn!(id = %record.id, ?reason, "highlight delete permanently rejected");
                            if applied(db.mark_highlight_needs_reconnect(&record.id), &record.id) {
                                reconnect_needed = true;
                            }
                        }
                        PushOutcome::Transient(msg) => {
                            warn!(id = %record.id, error = %msg, "highlight delete failed; will retry next pass");
                        }
                    }
                }

                SyncCandidate::HighlightDiscard { id } => {
                    // Never reached the remote; local cleanup only.
                    if let Err(e) = db.delete_highlight(&id) {
                        warn!(id = %id, error = %e, "failed to discard highlight");
                    } else {
                        notify_deleted(reporter, cancel, &id);
                    }
                }
            }
        }

        let status = if reconnect_needed {
            SyncRunStatus::CompletedWithReconnectNeeded
        } else {
            SyncRunStatus::Completed
        };
        info!(?status, "sync pass finished");
        Ok(status)
    }
}

/// A sync-state write that fails is logged and swallowed: the pass goes
/// on, and the record is retried next time (the idempotency key makes the
/// repeat harmless).
fn applied(result: Result<bool, DatabaseError>, id: &str) -> bool {
    match result {
        Ok(changed) => changed,
        Err(e) => {
            warn!(id, error = %e, "failed to persist sync state");
            false
        }
    }
}

fn notify_updated(reporter: &dyn SyncReporter, cancel: &CancelToken, record: SyncedRecord) {
    if !cancel.is_cancelled() {
        reporter.record_updated(&record);
    }
}

fn notify_deleted(reporter: &dyn SyncReporter, cancel: &CancelToken, id: &str) {
    if !cancel.is_cancelled() {
        reporter.record_deleted(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{HighlightRecord, ReadingRecord, SessionRecord};
    use crate::sync::types::{NullReporter, RejectReason};
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Remote double that tracks idempotency keys the way the real
    /// service is expected to: first create is accepted, repeats are
    /// no-op accepts.
    #[derive(Default)]
    struct StubRemote {
        offline: bool,
        connectivity_delay_ms: u64,
        transient_keys: HashSet<String>,
        gone_keys: HashSet<String>,
        seen_keys: Mutex<HashSet<String>>,
        creates_accepted: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    impl StubRemote {
        fn accepted_count(&self) -> usize {
            self.creates_accepted.lock().unwrap().len()
        }

        fn push(&self, key: &str) -> PushOutcome {
            if self.transient_keys.contains(key) {
                return PushOutcome::Transient("connection reset".into());
            }
            if self.gone_keys.contains(key) {
                return PushOutcome::Rejected(RejectReason::Gone);
            }
            let mut seen = self.seen_keys.lock().unwrap();
            if seen.insert(key.to_string()) {
                self.creates_accepted.lock().unwrap().push(key.to_string());
            }
            PushOutcome::Accepted {
                remote_id: Some(format!("rem-{key}")),
            }
        }
    }

    impl RemoteSyncClient for StubRemote {
        fn check_connectivity(&self) -> bool {
            if self.connectivity_delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.connectivity_delay_ms));
            }
            !self.offline
        }

        fn create_session_ping(
            &self,
            idempotency_key: &str,
            _reading_remote_id: &str,
            _progress_fraction: f64,
            _duration_seconds: u64,
            _occurred_at: chrono::DateTime<Utc>,
        ) -> PushOutcome {
            self.push(idempotency_key)
        }

        fn create_highlight(
            &self,
            idempotency_key: &str,
            _reading_remote_id: &str,
            _content: &str,
            _position: &str,
            _occurred_at: chrono::DateTime<Utc>,
        ) -> PushOutcome {
            self.push(idempotency_key)
        }

        fn delete_highlight(&self, remote_id: &str) -> PushOutcome {
            self.deletes.lock().unwrap().push(remote_id.to_string());
            PushOutcome::Accepted { remote_id: None }
        }
    }

    fn seeded_db() -> (Database, ReadingRecord) {
        let db = Database::open_memory().unwrap();
        let mut reading = ReadingRecord::new("Middlemarch", "George Eliot");
        reading.remote_id = Some("rem-book".into());
        db.insert_reading(&reading).unwrap();
        (db, reading)
    }

    fn run(orchestrator: &SyncOrchestrator, db: &Database) -> SyncRunStatus {
        orchestrator
            .run(db, &NullReporter, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn pushes_pending_session_and_marks_synced() {
        let (db, reading) = seeded_db();
        let session = SessionRecord::new(&reading.id, 1200, 0.3, Utc::now());
        db.insert_session(&session).unwrap();

        let remote = Arc::new(StubRemote::default());
        let orchestrator = SyncOrchestrator::new(remote.clone());

        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);
        assert_eq!(remote.accepted_count(), 1);
        assert_eq!(
            db.get_session(&session.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn repeated_pass_is_a_remote_noop() {
        let (db, reading) = seeded_db();
        let session = SessionRecord::new(&reading.id, 1200, 0.3, Utc::now());
        db.insert_session(&session).unwrap();

        let remote = Arc::new(StubRemote::default());

        // Simulate a crash after the remote accepted but before the local
        // mark: the remote has seen the key, the local row is still
        // pending.
        remote.push(&session.idempotency_key);
        assert_eq!(remote.accepted_count(), 1);

        let orchestrator = SyncOrchestrator::new(remote.clone());
        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);

        // Exactly one accepted create ever; the retry was recognized.
        assert_eq!(remote.accepted_count(), 1);
        assert_eq!(
            db.get_session(&session.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn transient_failure_leaves_record_pending_and_batch_alive() {
        let (db, reading) = seeded_db();
        let first = SessionRecord::new(&reading.id, 100, 0.1, Utc::now());
        let flaky = SessionRecord::new(&reading.id, 200, 0.2, Utc::now());
        let third = SessionRecord::new(&reading.id, 300, 0.3, Utc::now());
        for s in [&first, &flaky, &third] {
            db.insert_session(s).unwrap();
        }

        let remote = Arc::new(StubRemote {
            transient_keys: HashSet::from([flaky.idempotency_key.clone()]),
            ..Default::default()
        });
        let orchestrator = SyncOrchestrator::new(remote.clone());

        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);
        assert_eq!(
            db.get_session(&first.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
        assert_eq!(
            db.get_session(&flaky.id).unwrap().unwrap().sync_state,
            SyncState::Pending
        );
        assert_eq!(
            db.get_session(&third.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn permanent_rejection_halts_retries() {
        let (db, reading) = seeded_db();
        let doomed = SessionRecord::new(&reading.id, 100, 0.1, Utc::now());
        db.insert_session(&doomed).unwrap();

        let remote = Arc::new(StubRemote {
            gone_keys: HashSet::from([doomed.idempotency_key.clone()]),
            ..Default::default()
        });
        let orchestrator = SyncOrchestrator::new(remote.clone());

        assert_eq!(
            run(&orchestrator, &db),
            SyncRunStatus::CompletedWithReconnectNeeded
        );
        assert_eq!(
            db.get_session(&doomed.id).unwrap().unwrap().sync_state,
            SyncState::NeedsReconnect
        );

        // Still physically present, but no longer a candidate.
        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);
        assert_eq!(remote.accepted_count(), 0);
        assert!(db.get_session(&doomed.id).unwrap().is_some());
    }

    #[test]
    fn offline_skips_without_touching_candidates() {
        let (db, reading) = seeded_db();
        let session = SessionRecord::new(&reading.id, 100, 0.1, Utc::now());
        db.insert_session(&session).unwrap();

        let remote = Arc::new(StubRemote {
            offline: true,
            ..Default::default()
        });
        let orchestrator = SyncOrchestrator::new(remote.clone());

        assert_eq!(run(&orchestrator, &db), SyncRunStatus::SkippedNoNetwork);
        assert_eq!(remote.accepted_count(), 0);
        assert_eq!(
            db.get_session(&session.id).unwrap().unwrap().sync_state,
            SyncState::Pending
        );
    }

    #[test]
    fn concurrent_run_is_rejected_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concurrent.db");
        {
            let (db, reading) = {
                let db = Database::open_at(&path).unwrap();
                let mut reading = ReadingRecord::new("Racy", "");
                reading.remote_id = Some("rem-book".into());
                db.insert_reading(&reading).unwrap();
                (db, reading)
            };
            db.insert_session(&SessionRecord::new(&reading.id, 60, 0.1, Utc::now()))
                .unwrap();
        }

        let remote = Arc::new(StubRemote {
            connectivity_delay_ms: 200,
            ..Default::default()
        });
        let orchestrator = SyncOrchestrator::new(remote);

        let slow = {
            let orchestrator = orchestrator.clone();
            let path = path.clone();
            std::thread::spawn(move || {
                let db = Database::open_at(&path).unwrap();
                orchestrator
                    .run(&db, &NullReporter, &CancelToken::new())
                    .unwrap()
            })
        };
        // Let the first pass take the flag.
        std::thread::sleep(Duration::from_millis(50));

        let db = Database::open_at(&path).unwrap();
        let second = orchestrator
            .run(&db, &NullReporter, &CancelToken::new())
            .unwrap();
        assert_eq!(second, SyncRunStatus::AlreadyRunning);
        assert_eq!(slow.join().unwrap(), SyncRunStatus::Completed);
    }

    #[test]
    fn cancelled_pass_applies_results_but_drops_notifications() {
        #[derive(Default)]
        struct CountingReporter {
            calls: Mutex<usize>,
        }
        impl SyncReporter for CountingReporter {
            fn record_updated(&self, _record: &SyncedRecord) {
                *self.calls.lock().unwrap() += 1;
            }
            fn record_deleted(&self, _id: &str) {
                *self.calls.lock().unwrap() += 1;
            }
            fn pass_complete(&self, _status: SyncRunStatus) {
                *self.calls.lock().unwrap() += 1;
            }
        }

        let (db, reading) = seeded_db();
        let session = SessionRecord::new(&reading.id, 60, 0.1, Utc::now());
        db.insert_session(&session).unwrap();

        let orchestrator = SyncOrchestrator::new(Arc::new(StubRemote::default()));
        let reporter = CountingReporter::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let status = orchestrator.run(&db, &reporter, &cancel).unwrap();
        assert_eq!(status, SyncRunStatus::Completed);
        assert_eq!(*reporter.calls.lock().unwrap(), 0);
        assert_eq!(
            db.get_session(&session.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn highlight_lifecycle_create_delete_discard() {
        let (db, reading) = seeded_db();

        let created = HighlightRecord::new(&reading.id, "quote", "p. 4");
        let discarded = HighlightRecord::new(&reading.id, "gone before sync", "p. 5");
        db.insert_highlight(&created).unwrap();
        db.insert_highlight(&discarded).unwrap();
        db.mark_highlight_deleted(&discarded.id).unwrap();

        let remote = Arc::new(StubRemote::default());
        let orchestrator = SyncOrchestrator::new(remote.clone());
        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);

        // Create synced with the remote id; discard dropped locally with
        // no remote call.
        let synced = db.get_highlight(&created.id).unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Synced);
        assert_eq!(
            synced.remote_id.as_deref(),
            Some(format!("rem-{}", created.idempotency_key).as_str())
        );
        assert!(db.get_highlight(&discarded.id).unwrap().is_none());
        assert!(remote.deletes.lock().unwrap().is_empty());

        // Now soft-delete the synced one; the next pass propagates it.
        db.mark_highlight_deleted(&created.id).unwrap();
        assert_eq!(run(&orchestrator, &db), SyncRunStatus::Completed);
        assert!(db.get_highlight(&created.id).unwrap().is_none());
        assert_eq!(
            remote.deletes.lock().unwrap().as_slice(),
            [format!("rem-{}", created.idempotency_key)]
        );
    }
}
