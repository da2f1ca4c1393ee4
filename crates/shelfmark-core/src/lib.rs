//! # Shelfmark Core Library
//!
//! Core business logic for Shelfmark, a local-first reading tracker that
//! optionally mirrors activity to a remote reading service. All operations
//! are available via a standalone CLI binary; any GUI is a thin layer over
//! this library.
//!
//! ## Architecture
//!
//! - **Session Timer**: a wall-clock state machine measuring active
//!   reading time across pause/resume and across process death, persisted
//!   through an injected [`TimerStateStore`]
//! - **Storage**: SQLite-based record storage (readings, sessions,
//!   highlights) and TOML-based configuration
//! - **Sync**: a push engine that sends Pending records to the remote
//!   service with per-record idempotency keys and classifies every
//!   outcome in one place
//!
//! ## Key Components
//!
//! - [`SessionTimer`]: timer state machine
//! - [`Database`]: record persistence and the durable timer snapshot
//! - [`SyncOrchestrator`]: one-at-a-time sync passes
//! - [`HttpSyncClient`]: reqwest-backed remote client

pub mod auth;
pub mod error;
pub mod events;
pub mod storage;
pub mod sync;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use storage::{
    Config, Database, HighlightRecord, ReadingRecord, ReadingStatus, SessionRecord, SyncState,
};
pub use sync::{
    CancelToken, HttpSyncClient, RemoteSyncClient, SyncError, SyncOrchestrator, SyncReporter,
    SyncRunStatus,
};
pub use timer::{FinishedSession, SessionPhase, SessionTimer, TimerState, TimerStateStore};
