use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

/// Create a new user
pub async fn create_user(pool: &DbPool, new_user: &NewUser) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, avatar, created_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(&new_user.avatar)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Get user by ID
pub async fn get_user(pool: &DbPool, user_id: i64) -> Result<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {user_id} not found")))
}

/// Get user by username
pub async fn get_user_by_username(pool: &DbPool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

pub async fn username_exists(pool: &DbPool, username: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Check whether an email is taken, optionally ignoring one user (the one editing it)
pub async fn email_exists(pool: &DbPool, email: &str, except_user: Option<i64>) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND id != COALESCE(?, -1))",
    )
    .bind(email)
    .bind(except_user)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Update profile settings (email and avatar)
pub async fn update_settings(
    pool: &DbPool,
    user_id: i64,
    email: &str,
    avatar: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET email = ?, avatar = COALESCE(?, avatar)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(email)
    .bind(avatar)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("User {user_id} not found")))?;

    Ok(user)
}
