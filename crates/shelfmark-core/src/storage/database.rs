//! SQLite-based record storage.
//!
//! Provides persistent storage for:
//! - Readings (books being tracked)
//! - Reading sessions and highlights, each carrying sync-state fields
//! - Key-value store for small application state (timer snapshot)
//!
//! Sync-state columns are written only through the `mark_*` methods, which
//! enforce the Pending -> {Synced, NeedsReconnect} transition in SQL: the
//! UPDATE is predicated on the current state, so a revert is impossible no
//! matter who calls them.

use std::path::Path;

use rusqlite::{params, Connection, Row};
use tracing::debug;

use super::data_dir;
use super::records::{HighlightRecord, ReadingRecord, ReadingStatus, SessionRecord, SyncState};
use crate::error::DatabaseError;
use crate::timer::{TimerState, TimerStateStore, TIMER_STATE_KEY};

/// SQLite database for reading records.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data_dir>/shelfmark.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir().map_err(DatabaseError::DataDir)?.join("shelfmark.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS readings (
                    id                TEXT PRIMARY KEY,
                    title             TEXT NOT NULL,
                    author            TEXT NOT NULL DEFAULT '',
                    remote_id         TEXT,
                    status            TEXT NOT NULL DEFAULT 'reading',
                    progress_fraction REAL NOT NULL DEFAULT 0.0,
                    created_at        TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id                TEXT PRIMARY KEY,
                    idempotency_key   TEXT NOT NULL UNIQUE,
                    reading_id        TEXT NOT NULL REFERENCES readings(id),
                    duration_seconds  INTEGER NOT NULL,
                    progress_fraction REAL NOT NULL,
                    occurred_at       TEXT NOT NULL,
                    sync_state        TEXT NOT NULL DEFAULT 'pending'
                );

                CREATE TABLE IF NOT EXISTS highlights (
                    id              TEXT PRIMARY KEY,
                    idempotency_key TEXT NOT NULL UNIQUE,
                    reading_id      TEXT NOT NULL REFERENCES readings(id),
                    content         TEXT NOT NULL,
                    position        TEXT NOT NULL DEFAULT '',
                    occurred_at     TEXT NOT NULL,
                    sync_state      TEXT NOT NULL DEFAULT 'pending',
                    remote_id       TEXT,
                    deleted_by_user INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_sync_state ON sessions(sync_state);
                CREATE INDEX IF NOT EXISTS idx_sessions_reading ON sessions(reading_id);
                CREATE INDEX IF NOT EXISTS idx_highlights_sync_state ON highlights(sync_state);
                CREATE INDEX IF NOT EXISTS idx_highlights_reading ON highlights(reading_id);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── Readings ─────────────────────────────────────────────────────

    pub fn insert_reading(&self, reading: &ReadingRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO readings (id, title, author, remote_id, status, progress_fraction, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reading.id,
                reading.title,
                reading.author,
                reading.remote_id,
                reading.status.as_str(),
                reading.progress_fraction,
                reading.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_reading(&self, id: &str) -> Result<Option<ReadingRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, remote_id, status, progress_fraction, created_at
             FROM readings WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], reading_from_row)?;
        rows.next().transpose().map_err(DatabaseError::from)
    }

    pub fn list_readings(&self) -> Result<Vec<ReadingRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, remote_id, status, progress_fraction, created_at
             FROM readings ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], reading_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    pub fn set_reading_status(&self, id: &str, status: ReadingStatus) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE readings SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    pub fn set_reading_remote_id(&self, id: &str, remote_id: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE readings SET remote_id = ?1 WHERE id = ?2",
            params![remote_id, id],
        )?;
        Ok(())
    }

    pub fn set_reading_progress(&self, id: &str, fraction: f64) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE readings SET progress_fraction = ?1 WHERE id = ?2",
            params![fraction.clamp(0.0, 1.0), id],
        )?;
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn insert_session(&self, session: &SessionRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (id, idempotency_key, reading_id, duration_seconds,
                                   progress_fraction, occurred_at, sync_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                session.idempotency_key,
                session.reading_id,
                session.duration_seconds,
                session.progress_fraction,
                session.occurred_at,
                session.sync_state.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM sessions WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], session_from_row)?;
        rows.next().transpose().map_err(DatabaseError::from)
    }

    pub fn list_sessions(&self, reading_id: &str) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM sessions WHERE reading_id = ?1 ORDER BY occurred_at"
        ))?;
        let rows = stmt.query_map(params![reading_id], session_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    /// Pending sessions of remote-linked readings, paired with the
    /// reading's remote id. Stable insertion order.
    pub fn pending_sessions(&self) -> Result<Vec<(SessionRecord, String)>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLS_S}, r.remote_id
             FROM sessions s JOIN readings r ON r.id = s.reading_id
             WHERE s.sync_state = 'pending' AND r.remote_id IS NOT NULL
             ORDER BY s.rowid"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((session_from_row(row)?, row.get::<_, String>(7)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    pub fn mark_session_synced(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE sessions SET sync_state = 'synced'
             WHERE id = ?1 AND sync_state = 'pending'",
            params![id],
        )?;
        Ok(n > 0)
    }

    pub fn mark_session_needs_reconnect(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE sessions SET sync_state = 'needs_reconnect'
             WHERE id = ?1 AND sync_state = 'pending'",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// Reset NeedsReconnect records after re-authentication. This is the
    /// single external action that makes them eligible again. A highlight
    /// that already has a remote twin goes back to Synced (so a pending
    /// delete propagates); everything else goes back to Pending.
    pub fn reset_needs_reconnect(&self) -> Result<usize, DatabaseError> {
        let sessions = self.conn.execute(
            "UPDATE sessions SET sync_state = 'pending' WHERE sync_state = 'needs_reconnect'",
            [],
        )?;
        let highlights = self.conn.execute(
            "UPDATE highlights
             SET sync_state = CASE
                 WHEN remote_id IS NOT NULL THEN 'synced'
                 ELSE 'pending'
             END
             WHERE sync_state = 'needs_reconnect'",
            [],
        )?;
        Ok(sessions + highlights)
    }

    // ── Highlights ───────────────────────────────────────────────────

    pub fn insert_highlight(&self, highlight: &HighlightRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO highlights (id, idempotency_key, reading_id, content, position,
                                     occurred_at, sync_state, remote_id, deleted_by_user)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                highlight.id,
                highlight.idempotency_key,
                highlight.reading_id,
                highlight.content,
                highlight.position,
                highlight.occurred_at,
                highlight.sync_state.as_str(),
                highlight.remote_id,
                highlight.deleted_by_user,
            ],
        )?;
        Ok(())
    }

    pub fn get_highlight(&self, id: &str) -> Result<Option<HighlightRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HIGHLIGHT_COLS} FROM highlights WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], highlight_from_row)?;
        rows.next().transpose().map_err(DatabaseError::from)
    }

    /// Highlights of a reading that the user hasn't deleted.
    pub fn list_highlights(&self, reading_id: &str) -> Result<Vec<HighlightRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HIGHLIGHT_COLS} FROM highlights
             WHERE reading_id = ?1 AND deleted_by_user = 0 ORDER BY occurred_at"
        ))?;
        let rows = stmt.query_map(params![reading_id], highlight_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    /// Pending, not-deleted highlights of remote-linked readings, paired
    /// with the reading's remote id.
    pub fn pending_highlights(&self) -> Result<Vec<(HighlightRecord, String)>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HIGHLIGHT_COLS_H}, r.remote_id
             FROM highlights h JOIN readings r ON r.id = h.reading_id
             WHERE h.sync_state = 'pending' AND h.deleted_by_user = 0
               AND r.remote_id IS NOT NULL
             ORDER BY h.rowid"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((highlight_from_row(row)?, row.get::<_, String>(9)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    /// Soft-deleted highlights that were never pushed: local cleanup only.
    pub fn deleted_unsynced_highlights(&self) -> Result<Vec<HighlightRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HIGHLIGHT_COLS} FROM highlights
             WHERE sync_state = 'pending' AND deleted_by_user = 1 ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([], highlight_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    /// Soft-deleted highlights that exist remotely: need a remote delete.
    pub fn deleted_synced_highlights(&self) -> Result<Vec<HighlightRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HIGHLIGHT_COLS} FROM highlights
             WHERE sync_state = 'synced' AND deleted_by_user = 1
               AND remote_id IS NOT NULL
             ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([], highlight_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
    }

    pub fn mark_highlight_synced(
        &self,
        id: &str,
        remote_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE highlights SET sync_state = 'synced', remote_id = ?2
             WHERE id = ?1 AND sync_state = 'pending'",
            params![id, remote_id],
        )?;
        Ok(n > 0)
    }

    pub fn mark_highlight_needs_reconnect(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE highlights SET sync_state = 'needs_reconnect'
             WHERE id = ?1 AND sync_state IN ('pending', 'synced')",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// Soft delete: the row stays until remote deletion propagates.
    pub fn mark_highlight_deleted(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE highlights SET deleted_by_user = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// Physical removal, once remote deletion (or local discard) is done.
    pub fn delete_highlight(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM highlights WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Counts of records still waiting to be pushed (sessions, highlights).
    pub fn pending_counts(&self) -> Result<(u64, u64), DatabaseError> {
        let sessions: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE sync_state = 'pending'",
            [],
            |row| row.get(0),
        )?;
        let highlights: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM highlights
             WHERE sync_state = 'pending' OR (sync_state = 'synced' AND deleted_by_user = 1)",
            [],
            |row| row.get(0),
        )?;
        Ok((sessions, highlights))
    }

    // ── Key-value store ──────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// The timer snapshot lives in the kv table as JSON, so a single-row write
/// persists it atomically.
impl TimerStateStore for Database {
    fn load_timer_state(&self) -> Option<TimerState> {
        let json = self.kv_get(TIMER_STATE_KEY).ok()??;
        match serde_json::from_str(&json) {
            Ok(state) => Some(state),
            Err(e) => {
                // Corrupt snapshot: start fresh rather than fail a session.
                debug!(error = %e, "discarding unreadable timer snapshot");
                None
            }
        }
    }

    fn save_timer_state(&self, state: &TimerState) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(state)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        self.kv_set(TIMER_STATE_KEY, &json)
    }

    fn clear_timer_state(&self) -> Result<(), DatabaseError> {
        self.kv_delete(TIMER_STATE_KEY)
    }
}

const SESSION_COLS: &str =
    "id, idempotency_key, reading_id, duration_seconds, progress_fraction, occurred_at, sync_state";
const SESSION_COLS_S: &str =
    "s.id, s.idempotency_key, s.reading_id, s.duration_seconds, s.progress_fraction, s.occurred_at, s.sync_state";
const HIGHLIGHT_COLS: &str =
    "id, idempotency_key, reading_id, content, position, occurred_at, sync_state, remote_id, deleted_by_user";
const HIGHLIGHT_COLS_H: &str =
    "h.id, h.idempotency_key, h.reading_id, h.content, h.position, h.occurred_at, h.sync_state, h.remote_id, h.deleted_by_user";

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<ReadingRecord> {
    Ok(ReadingRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        remote_id: row.get(3)?,
        status: parse_col(row, 4, ReadingStatus::parse)?,
        progress_fraction: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        idempotency_key: row.get(1)?,
        reading_id: row.get(2)?,
        duration_seconds: row.get(3)?,
        progress_fraction: row.get(4)?,
        occurred_at: row.get(5)?,
        sync_state: parse_col(row, 6, SyncState::parse)?,
    })
}

fn highlight_from_row(row: &Row<'_>) -> rusqlite::Result<HighlightRecord> {
    Ok(HighlightRecord {
        id: row.get(0)?,
        idempotency_key: row.get(1)?,
        reading_id: row.get(2)?,
        content: row.get(3)?,
        position: row.get(4)?,
        occurred_at: row.get(5)?,
        sync_state: parse_col(row, 6, SyncState::parse)?,
        remote_id: row.get(7)?,
        deleted_by_user: row.get(8)?,
    })
}

fn parse_col<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unrecognized value: {text}").into(),
        )
    })
}
