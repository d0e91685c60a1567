//! Token command implementation.

use rowsync_cli::CliError;
use rowsync_server::{AuthConfig, TokenValidator};

/// Prints a bearer token for `user_id` signed with `secret`.
///
/// Expiry is enforced by the server that validates the token, counted from
/// now.
pub fn run(secret: &str, user_id: &str) -> Result<(), CliError> {
    if secret.is_empty() {
        return Err(CliError::Usage("secret must not be empty".into()));
    }
    let validator = TokenValidator::new(AuthConfig::new(secret.as_bytes().to_vec()));
    println!("{}", validator.create_token(user_id)?);
    Ok(())
}
