//! Durable timer snapshot and the store it lives in.
//!
//! The snapshot is small enough to round-trip as JSON through a key-value
//! slot. The store is an injected dependency so the timer never reaches
//! through ambient global state.

use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Key under which the snapshot is persisted in the kv store.
pub const TIMER_STATE_KEY: &str = "timer_state";

/// Persisted timer snapshot.
///
/// `running_since_epoch_ms` is `Some` iff the timer was running when the
/// snapshot was written. Running and paused are mutually exclusive by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Reading this timer measures.
    pub reading_id: String,
    /// Elapsed active time excluding any currently-running interval.
    pub accumulated_ms: u64,
    /// Wall-clock start of the current running interval, if any.
    #[serde(default)]
    pub running_since_epoch_ms: Option<u64>,
}

/// Durable home for the timer snapshot.
///
/// A corrupt or missing snapshot loads as `None` -- losing a partial timer
/// is preferable to failing a reading session.
pub trait TimerStateStore {
    fn load_timer_state(&self) -> Option<TimerState>;
    fn save_timer_state(&self, state: &TimerState) -> Result<(), DatabaseError>;
    fn clear_timer_state(&self) -> Result<(), DatabaseError>;
}

/// In-memory store for tests and throwaway timers.
#[derive(Debug, Default)]
pub struct MemoryTimerStateStore {
    slot: std::sync::Mutex<Option<TimerState>>,
}

impl MemoryTimerStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimerStateStore for MemoryTimerStateStore {
    fn load_timer_state(&self) -> Option<TimerState> {
        self.slot.lock().ok()?.clone()
    }

    fn save_timer_state(&self, state: &TimerState) -> Result<(), DatabaseError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(state.clone());
        }
        Ok(())
    }

    fn clear_timer_state(&self) -> Result<(), DatabaseError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_as_json() {
        let state = TimerState {
            reading_id: "r-1".into(),
            accumulated_ms: 90_000,
            running_since_epoch_ms: Some(1_700_000_000_000),
        };
        let json = serde_json::to_string(&state).unwrap();
        let back: TimerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn missing_running_since_deserializes_as_paused() {
        let json = r#"{"reading_id":"r-1","accumulated_ms":5000}"#;
        let state: TimerState = serde_json::from_str(json).unwrap();
        assert_eq!(state.running_since_epoch_ms, None);
    }

    #[test]
    fn memory_store_save_load_clear() {
        let store = MemoryTimerStateStore::new();
        assert!(store.load_timer_state().is_none());

        let state = TimerState {
            reading_id: "r-1".into(),
            accumulated_ms: 0,
            running_since_epoch_ms: None,
        };
        store.save_timer_state(&state).unwrap();
        assert_eq!(store.load_timer_state(), Some(state));

        store.clear_timer_state().unwrap();
        assert!(store.load_timer_state().is_none());
    }
}
