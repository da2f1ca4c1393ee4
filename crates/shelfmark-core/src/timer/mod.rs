mod session;
mod state;

pub use session::{FinishedSession, SessionPhase, SessionTimer};
pub use state::{MemoryTimerStateStore, TimerState, TimerStateStore, TIMER_STATE_KEY};
