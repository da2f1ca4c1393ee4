//! Session timer implementation.
//!
//! The timer is a wall-clock-based state machine. It does not use internal
//! threads - display refresh is the caller's concern, via periodic
//! `elapsed()` reads.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running <-> Paused -> Stopped
//! ```
//!
//! Pause and checkpoint persist the snapshot synchronously so the machine
//! can be rebuilt by `restore()` after an arbitrary process kill. A
//! snapshot written while Running keeps its original start instant, so
//! elapsed time keeps accruing across the gap - a killed process must not
//! silently pause the user's reading session.

use chrono::Utc;
use tracing::warn;

use super::state::{TimerState, TimerStateStore};
use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Stopped,
    Running,
    Paused,
}

/// Outcome of `finalize()`, ready to be turned into a session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub reading_id: String,
    pub elapsed_ms: u64,
}

/// Wall-clock session timer.
///
/// None of the operations can fail: invalid transitions are silent no-ops,
/// and a persistence failure leaves the in-memory state authoritative for
/// the rest of the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct SessionTimer {
    snapshot: Option<TimerState>,
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the timer from whatever the store holds.
    ///
    /// A missing or corrupt snapshot yields a fresh stopped timer.
    pub fn restore(store: &dyn TimerStateStore) -> Self {
        Self {
            snapshot: store.load_timer_state(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        match &self.snapshot {
            None => SessionPhase::Stopped,
            Some(s) if s.running_since_epoch_ms.is_some() => SessionPhase::Running,
            Some(_) => SessionPhase::Paused,
        }
    }

    pub fn reading_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.reading_id.as_str())
    }

    /// Total active milliseconds, including the running interval if any.
    pub fn elapsed_ms(&self) -> u64 {
        match &self.snapshot {
            None => 0,
            Some(s) => {
                let running = s
                    .running_since_epoch_ms
                    .map(|since| now_ms().saturating_sub(since))
                    .unwrap_or(0);
                s.accumulated_ms + running
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start measuring a new session. No-op unless stopped.
    pub fn start(&mut self, store: &dyn TimerStateStore, reading_id: &str) -> Option<Event> {
        if self.snapshot.is_some() {
            return None; // Already measuring.
        }
        let state = TimerState {
            reading_id: reading_id.to_string(),
            accumulated_ms: 0,
            running_since_epoch_ms: Some(now_ms()),
        };
        persist(store, &state);
        self.snapshot = Some(state);
        Some(Event::TimerStarted {
            reading_id: reading_id.to_string(),
            at: Utc::now(),
        })
    }

    /// Fold the running interval into the accumulator and persist. No-op
    /// unless running.
    pub fn pause(&mut self, store: &dyn TimerStateStore) -> Option<Event> {
        let state = self.snapshot.as_mut()?;
        let since = state.running_since_epoch_ms.take()?;
        state.accumulated_ms += now_ms().saturating_sub(since);
        persist(store, state);
        Some(Event::TimerPaused {
            reading_id: state.reading_id.clone(),
            elapsed_ms: state.accumulated_ms,
            at: Utc::now(),
        })
    }

    /// Begin a new running interval. No-op unless paused.
    pub fn resume(&mut self, store: &dyn TimerStateStore) -> Option<Event> {
        let state = self.snapshot.as_mut()?;
        if state.running_since_epoch_ms.is_some() {
            return None; // Already running.
        }
        state.running_since_epoch_ms = Some(now_ms());
        persist(store, state);
        Some(Event::TimerResumed {
            reading_id: state.reading_id.clone(),
            elapsed_ms: state.accumulated_ms,
            at: Utc::now(),
        })
    }

    /// Persist the current state without transitioning (the
    /// backgrounding-equivalent event). No-op when stopped.
    pub fn checkpoint(&self, store: &dyn TimerStateStore) -> Option<Event> {
        let state = self.snapshot.as_ref()?;
        persist(store, state);
        Some(Event::TimerCheckpointed {
            reading_id: state.reading_id.clone(),
            elapsed_ms: self.elapsed_ms(),
            at: Utc::now(),
        })
    }

    /// Stop the timer and hand the total back for record creation.
    /// Clears the persisted snapshot. No-op when stopped.
    pub fn finalize(&mut self, store: &dyn TimerStateStore) -> Option<FinishedSession> {
        let total = self.elapsed_ms();
        let state = self.snapshot.take()?;
        clear(store);
        Some(FinishedSession {
            reading_id: state.reading_id,
            elapsed_ms: total,
        })
    }

    /// Throw the session away without producing a record. No-op when
    /// stopped.
    pub fn discard(&mut self, store: &dyn TimerStateStore) -> Option<Event> {
        let state = self.snapshot.take()?;
        clear(store);
        Some(Event::TimerDiscarded {
            reading_id: state.reading_id,
            at: Utc::now(),
        })
    }
}

fn persist(store: &dyn TimerStateStore, state: &TimerState) {
    if let Err(e) = store.save_timer_state(state) {
        // In-memory state stays authoritative; a restart may lose the
        // interval since the last successful persist.
        warn!(error = %e, "failed to persist timer state");
    }
}

fn clear(store: &dyn TimerStateStore) {
    if let Err(e) = store.clear_timer_state() {
        warn!(error = %e, "failed to clear timer state");
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
