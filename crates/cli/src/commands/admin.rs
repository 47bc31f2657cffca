//! Admin rights management.
//!
//! Users register through the storefront; this command flips the admin flag
//! on an existing account. The change applies from the user's next login.

use corner_shop_core::Email;
use corner_shop_storefront::db::{RepositoryError, UserRepository};

use super::{CommandError, connect};

/// Grant (`is_admin = true`) or revoke admin rights for the user with `email`.
///
/// # Errors
///
/// Returns an error if the email is invalid, no such user exists, or the
/// database update fails.
pub async fn set_admin(email: &str, is_admin: bool) -> Result<(), CommandError> {
    let email = Email::parse(email).map_err(|e| CommandError::Invalid(e.to_string()))?;
    let pool = connect().await?;

    let user = UserRepository::new(&pool)
        .set_admin(&email, is_admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                CommandError::Invalid(format!("No user with email {email}"))
            }
            other => other.into(),
        })?;

    if is_admin {
        tracing::info!(user_id = %user.id, email = %user.email, "admin rights granted");
    } else {
        tracing::info!(user_id = %user.id, email = %user.email, "admin rights revoked");
    }
    Ok(())
}
