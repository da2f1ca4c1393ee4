//! Sync subcommand.
//!
//! `sync run` pushes everything pending; `sync status` shows what is
//! waiting. A pass is also triggered opportunistically after local
//! mutations (timer finish, highlight removal) when auto-sync is on and a
//! token is available.

use std::sync::Arc;

use clap::Subcommand;
use serde::Serialize;
use shelfmark_core::storage::{Config, Database};
use shelfmark_core::sync::{
    CancelToken, HttpSyncClient, SyncOrchestrator, SyncReporter, SyncRunStatus, SyncedRecord,
};
use shelfmark_core::auth;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Push pending records to the remote service
    Run,
    /// Show counts of records waiting to sync
    Status,
}

#[derive(Serialize)]
struct PendingStatus {
    pending_sessions: u64,
    pending_highlights: u64,
}

pub fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        SyncAction::Run => {
            let config = Config::load()?;
            if !config.remote.enabled {
                return Err("remote sync is disabled in config.toml".into());
            }
            let token = auth::load_token()?
                .ok_or("not authenticated; run 'shelfmark auth login <token>'")?;

            let status = run_pass(&db, &config, &token)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        SyncAction::Status => {
            let (pending_sessions, pending_highlights) = db.pending_counts()?;
            let status = PendingStatus {
                pending_sessions,
                pending_highlights,
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}

/// Best-effort pass after a local mutation. Quiet on every early exit:
/// sync being unavailable must never get in the way of recording.
pub(crate) fn auto_sync(db: &Database) {
    let Ok(config) = Config::load() else { return };
    if !config.remote.enabled || !config.remote.auto_sync {
        return;
    }
    let Some(token) = auth::load_token().ok().flatten() else {
        return;
    };
    match run_pass(db, &config, &token) {
        Ok(status) => eprintln!("sync: {}", status_label(status)),
        Err(e) => eprintln!("sync failed: {e}"),
    }
}

fn run_pass(
    db: &Database,
    config: &Config,
    token: &str,
) -> Result<SyncRunStatus, Box<dyn std::error::Error>> {
    let client = HttpSyncClient::new(&config.remote.base_url, token)?;
    let orchestrator = SyncOrchestrator::new(Arc::new(client));
    let status = orchestrator.run(db, &PrintReporter, &CancelToken::new())?;

    if status == SyncRunStatus::CompletedWithReconnectNeeded {
        eprintln!("some records need you to sign in again: shelfmark auth login <token>");
    }
    Ok(status)
}

fn status_label(status: SyncRunStatus) -> &'static str {
    match status {
        SyncRunStatus::Completed => "completed",
        SyncRunStatus::CompletedWithReconnectNeeded => "completed (reconnect needed)",
        SyncRunStatus::SkippedNoNetwork => "skipped (no network)",
        SyncRunStatus::AlreadyRunning => "skipped (already running)",
    }
}

/// Prints per-record progress to stderr, keeping stdout for JSON.
struct PrintReporter;

impl SyncReporter for PrintReporter {
    fn record_updated(&self, record: &SyncedRecord) {
        match record {
            SyncedRecord::Session(s) => {
                eprintln!("  session {} -> {}", s.id, s.sync_state.as_str())
            }
            SyncedRecord::Highlight(h) => {
                eprintln!("  highlight {} -> {}", h.id, h.sync_state.as_str())
            }
        }
    }

    fn record_deleted(&self, id: &str) {
        eprintln!("  highlight {id} removed remotely");
    }
}
