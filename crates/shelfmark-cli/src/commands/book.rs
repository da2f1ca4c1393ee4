use clap::Subcommand;
use shelfmark_core::storage::{Database, ReadingRecord, ReadingStatus};

#[derive(Subcommand)]
pub enum BookAction {
    /// Add a book to the shelf
    Add {
        title: String,
        /// Author name
        #[arg(long, default_value = "")]
        author: String,
    },
    /// List tracked books as JSON
    List,
    /// Mark a book finished
    Finish { id: String },
    /// Mark a book abandoned
    Abandon { id: String },
    /// Attach the remote reading id, making the book's activity syncable
    Link { id: String, remote_id: String },
}

pub fn run(action: BookAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        BookAction::Add { title, author } => {
            let reading = ReadingRecord::new(&title, &author);
            db.insert_reading(&reading)?;
            println!("{}", serde_json::to_string_pretty(&reading)?);
        }
        BookAction::List => {
            println!("{}", serde_json::to_string_pretty(&db.list_readings()?)?);
        }
        BookAction::Finish { id } => {
            require_reading(&db, &id)?;
            db.set_reading_status(&id, ReadingStatus::Finished)?;
            db.set_reading_progress(&id, 1.0)?;
            println!("Finished: {id}");
        }
        BookAction::Abandon { id } => {
            require_reading(&db, &id)?;
            db.set_reading_status(&id, ReadingStatus::Abandoned)?;
            println!("Abandoned: {id}");
        }
        BookAction::Link { id, remote_id } => {
            require_reading(&db, &id)?;
            db.set_reading_remote_id(&id, &remote_id)?;
            println!("Linked {id} -> {remote_id}");
        }
    }
    Ok(())
}

pub(crate) fn require_reading(
    db: &Database,
    id: &str,
) -> Result<ReadingRecord, Box<dyn std::error::Error>> {
    db.get_reading(id)?
        .ok_or_else(|| format!("No book with id {id}").into())
}
