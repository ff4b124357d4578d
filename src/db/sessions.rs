use crate::db::{models::*, DbPool};
use crate::error::Result;
use chrono::{Duration, Utc};

/// Store a new session for a user
pub async fn create_session(
    pool: &DbPool,
    token_hash: &str,
    user_id: i64,
    ttl: Duration,
) -> Result<Session> {
    let now = Utc::now();

    let session = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(now)
    .bind(now + ttl)
    .fetch_one(pool)
    .await?;

    Ok(session)
}

/// Resolve a session token hash to its user, ignoring expired sessions
pub async fn get_session_user(pool: &DbPool, token_hash: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > ?
        "#,
    )
    .bind(token_hash)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn delete_session(pool: &DbPool, token_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete expired sessions
pub async fn delete_expired_sessions(pool: &DbPool) -> Result<i64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(Utc::now())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() as i64)
}
