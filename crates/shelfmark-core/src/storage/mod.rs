mod config;
pub mod database;
pub mod records;

pub use config::{Config, RemoteConfig, TimerConfig};
pub use database::Database;
pub use records::{HighlightRecord, ReadingRecord, ReadingStatus, SessionRecord, SyncState};

use std::path::PathBuf;

/// Returns the application data directory, creating it if needed.
///
/// Resolution order:
/// 1. `SHELFMARK_DATA_DIR` -- explicit override (tests, portable installs)
/// 2. `~/.config/shelfmark-dev/` when `SHELFMARK_ENV=dev`
/// 3. `~/.config/shelfmark/`
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = if let Ok(explicit) = std::env::var("SHELFMARK_DATA_DIR") {
        PathBuf::from(explicit)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");
        let env = std::env::var("SHELFMARK_ENV").unwrap_or_else(|_| "production".to_string());
        if env == "dev" {
            base_dir.join("shelfmark-dev")
        } else {
            base_dir.join("shelfmark")
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
