use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower_cookies::Cookies;

use super::session::{hash_token, SESSION_COOKIE};
use crate::api::handlers::AppState;
use crate::db::{models::User, sessions};
use crate::error::{Error, Result};

/// The requesting user, if the request carries a valid session cookie or
/// HTTP Basic credentials
pub struct MaybeUser(pub Option<User>);

/// Like [`MaybeUser`] but rejects anonymous requests with 401
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
            let value = value
                .to_str()
                .map_err(|_| Error::Unauthorized("Invalid authorization header".to_string()))?;
            if let Some(encoded) = value.strip_prefix("Basic ") {
                let user = basic_auth(state, encoded).await?;
                return Ok(MaybeUser(Some(user)));
            }
        }

        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| Error::Internal(msg.to_string()))?;

        if let Some(cookie) = cookies.get(SESSION_COOKIE) {
            let user = sessions::get_session_user(&state.pool, &hash_token(cookie.value())).await?;
            return Ok(MaybeUser(user));
        }

        Ok(MaybeUser(None))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match MaybeUser::from_request_parts(parts, state).await? {
            MaybeUser(Some(user)) => Ok(AuthUser(user)),
            MaybeUser(None) => Err(Error::Unauthorized(
                "Authentication credentials were not provided".to_string(),
            )),
        }
    }
}

async fn basic_auth(state: &AppState, encoded: &str) -> Result<User> {
    let invalid = || Error::Unauthorized("Invalid username/password".to_string());

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (username, password) = decoded.split_once(':').ok_or_else(invalid)?;

    super::authenticate(&state.pool, username, password)
        .await?
        .ok_or_else(invalid)
}
