//! Timer subcommand.
//!
//! Every invocation is a fresh process, so the timer is rebuilt from its
//! persisted snapshot each time and persisted again by the operations
//! that mutate it. Killing the process mid-session loses nothing: a
//! running snapshot keeps accruing time until it is paused, finished, or
//! discarded.

use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;
use shelfmark_core::storage::{Database, SessionRecord};
use shelfmark_core::timer::{SessionPhase, SessionTimer};

use super::book::require_reading;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a reading session for a book
    Start { reading_id: String },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// Print current timer state as JSON
    Status,
    /// Finish the session and record it for sync
    Finish {
        /// Updated progress through the book, 0.0 - 1.0
        #[arg(long)]
        progress: Option<f64>,
    },
    /// Abandon the session without recording anything
    Discard,
}

#[derive(Serialize)]
struct TimerStatus<'a> {
    phase: SessionPhase,
    reading_id: Option<&'a str>,
    elapsed_ms: u64,
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let mut timer = SessionTimer::restore(&db);

    match action {
        TimerAction::Start { reading_id } => {
            require_reading(&db, &reading_id)?;
            match timer.start(&db, &reading_id) {
                Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
                None => return Err("a session is already in progress".into()),
            }
        }
        TimerAction::Pause => match timer.pause(&db) {
            Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
            None => print_status(&timer)?,
        },
        TimerAction::Resume => match timer.resume(&db) {
            Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
            None => print_status(&timer)?,
        },
        TimerAction::Status => print_status(&timer)?,
        TimerAction::Finish { progress } => {
            let finished = timer
                .finalize(&db)
                .ok_or("no session in progress")?;
            let reading = require_reading(&db, &finished.reading_id)?;

            let fraction = progress
                .unwrap_or(reading.progress_fraction)
                .clamp(0.0, 1.0);
            if progress.is_some() {
                db.set_reading_progress(&reading.id, fraction)?;
            }

            let session = SessionRecord::new(
                &finished.reading_id,
                finished.elapsed_ms / 1000,
                fraction,
                Utc::now(),
            );
            db.insert_session(&session)?;
            println!("{}", serde_json::to_string_pretty(&session)?);

            super::sync::auto_sync(&db);
        }
        TimerAction::Discard => match timer.discard(&db) {
            Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
            None => return Err("no session in progress".into()),
        },
    }
    Ok(())
}

fn print_status(timer: &SessionTimer) -> Result<(), Box<dyn std::error::Error>> {
    let status = TimerStatus {
        phase: timer.phase(),
        reading_id: timer.reading_id(),
        elapsed_ms: timer.elapsed_ms(),
    };
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
