use crate::config::AuthConfig;
use crate::db::{sessions, DbPool};
use crate::error::Result;
use sha2::{Digest, Sha256};
use tower_cookies::cookie::{time, SameSite};
use tower_cookies::{Cookie, Cookies};
use tracing::debug;

pub const SESSION_COOKIE: &str = "sessionid";

/// Fresh random session token
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Only this digest of a token is persisted
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Create a session row for the user and hand its token to the browser
pub async fn start(pool: &DbPool, cookies: &Cookies, config: &AuthConfig, user_id: i64) -> Result<()> {
    let token = new_token();
    sessions::create_session(
        pool,
        &hash_token(&token),
        user_id,
        chrono::Duration::hours(config.session_ttl_hours),
    )
    .await?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies)
        .max_age(time::Duration::hours(config.session_ttl_hours))
        .build();
    cookies.add(cookie);

    debug!("Session started for user {}", user_id);
    Ok(())
}

/// Drop the current session, if any, server side and in the browser
pub async fn end(pool: &DbPool, cookies: &Cookies) -> Result<()> {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        sessions::delete_session(pool, &hash_token(cookie.value())).await?;
    }
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    Ok(())
}
