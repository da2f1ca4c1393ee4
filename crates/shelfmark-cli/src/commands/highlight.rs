use clap::Subcommand;
use shelfmark_core::storage::{Database, HighlightRecord};

use super::book::require_reading;

#[derive(Subcommand)]
pub enum HighlightAction {
    /// Mark a passage
    Add {
        reading_id: String,
        content: String,
        /// Where in the book, e.g. "p. 142" or "loc 2301"
        #[arg(long, default_value = "")]
        position: String,
    },
    /// Remove a highlight (the removal reaches the remote on the next sync)
    Remove { id: String },
    /// List a book's highlights as JSON
    List { reading_id: String },
}

pub fn run(action: HighlightAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        HighlightAction::Add {
            reading_id,
            content,
            position,
        } => {
            require_reading(&db, &reading_id)?;
            let highlight = HighlightRecord::new(&reading_id, &content, &position);
            db.insert_highlight(&highlight)?;
            println!("{}", serde_json::to_string_pretty(&highlight)?);
        }
        HighlightAction::Remove { id } => {
            if !db.mark_highlight_deleted(&id)? {
                return Err(format!("No highlight with id {id}").into());
            }
            println!("Removed: {id}");
            super::sync::auto_sync(&db);
        }
        HighlightAction::List { reading_id } => {
            require_reading(&db, &reading_id)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&db.list_highlights(&reading_id)?)?
            );
        }
    }
    Ok(())
}
