//! Remote service credentials.
//!
//! The API token lives in the OS keyring. `SHELFMARK_TOKEN` overrides it
//! for headless environments. Token exchange itself (how the user obtains
//! a token) is the remote service's concern, not ours.

use keyring::Entry;
use thiserror::Error;

const KEYRING_SERVICE: &str = "shelfmark";
const KEYRING_USER: &str = "api-token";

/// Environment override, taking precedence over the keyring.
pub const TOKEN_ENV: &str = "SHELFMARK_TOKEN";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Store the API token in the OS keyring.
pub fn store_token(token: &str) -> Result<(), AuthError> {
    Entry::new(KEYRING_SERVICE, KEYRING_USER)?.set_password(token)?;
    Ok(())
}

/// Resolve the API token. Absence is not an error.
pub fn load_token() -> Result<Option<String>, AuthError> {
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.is_empty() {
            return Ok(Some(token));
        }
    }
    match Entry::new(KEYRING_SERVICE, KEYRING_USER)?.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove the stored token. Removing a missing token is a no-op.
pub fn clear_token() -> Result<(), AuthError> {
    match Entry::new(KEYRING_SERVICE, KEYRING_USER)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
