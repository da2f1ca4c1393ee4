use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every session-timer transition produces an Event.
/// Callers render or log them; the core never calls back into UI code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        reading_id: String,
        at: DateTime<Utc>,
    },
    TimerPaused {
        reading_id: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        reading_id: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    /// State persisted without a transition (backgrounding checkpoint).
    TimerCheckpointed {
        reading_id: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    TimerDiscarded {
        reading_id: String,
        at: DateTime<Utc>,
    },
}
