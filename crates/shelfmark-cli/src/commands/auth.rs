use clap::Subcommand;
use shelfmark_core::auth;
use shelfmark_core::storage::Database;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the remote API token
    Login { token: String },
    /// Remove the stored token
    Logout,
    /// Show whether a token is configured
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Login { token } => {
            auth::store_token(&token)?;
            // Re-authentication is the one action that makes permanently
            // refused records eligible again.
            let reset = Database::open()?.reset_needs_reconnect()?;
            if reset > 0 {
                println!("Logged in; {reset} stalled record(s) queued for retry");
            } else {
                println!("Logged in");
            }
        }
        AuthAction::Logout => {
            auth::clear_token()?;
            println!("Logged out");
        }
        AuthAction::Status => match auth::load_token()? {
            Some(_) => println!("Authenticated"),
            None => println!("Not authenticated"),
        },
    }
    Ok(())
}
