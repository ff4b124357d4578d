//! Password hashing, login sessions and request extractors.

pub mod extract;
pub mod password;
pub mod session;

pub use extract::{AuthUser, MaybeUser};

use crate::db::{models::User, users, DbPool};
use crate::error::{Error, Result};

/// Check a username/password pair, returning the user when it matches
pub async fn authenticate(pool: &DbPool, username: &str, password: &str) -> Result<Option<User>> {
    let Some(user) = users::get_user_by_username(pool, username).await? else {
        return Ok(None);
    };

    let valid = password::verify_password(password.to_string(), &user.password_hash)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    Ok(valid.then_some(user))
}
