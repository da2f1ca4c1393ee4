use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shelfmark", version, about = "Shelfmark reading tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Books on the shelf
    Book {
        #[command(subcommand)]
        action: commands::book::BookAction,
    },
    /// Reading session timer
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Highlights
    Highlight {
        #[command(subcommand)]
        action: commands::highlight::HighlightAction,
    },
    /// Remote synchronization
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Remote credentials
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
}

fn main() {
    setup_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Book { action } => commands::book::run(action),
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Highlight { action } => commands::highlight::run(action),
        Commands::Sync { action } => commands::sync::run(action),
        Commands::Auth { action } => commands::auth::run(action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
