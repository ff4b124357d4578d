//! Toggle voting on questions and answers.
//!
//! A user holds at most one vote per target. Voting the same way twice
//! withdraws the vote, voting the other way flips it. The target's cached
//! `rating` is adjusted in the same transaction as the vote row, so the two
//! never disagree as long as every change goes through [`vote`].

use crate::db::{self, DbPool};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// What is being voted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTarget {
    Question,
    Answer,
}

impl VoteTarget {
    fn table(self) -> &'static str {
        match self {
            VoteTarget::Question => "questions",
            VoteTarget::Answer => "answers",
        }
    }

    fn vote_table(self) -> &'static str {
        match self {
            VoteTarget::Question => "question_votes",
            VoteTarget::Answer => "answer_votes",
        }
    }

    fn foreign_key(self) -> &'static str {
        match self {
            VoteTarget::Question => "question_id",
            VoteTarget::Answer => "answer_id",
        }
    }

    /// Human name used in error messages
    pub fn noun(self) -> &'static str {
        match self {
            VoteTarget::Question => "question",
            VoteTarget::Answer => "answer",
        }
    }
}

/// A single vote: +1 or -1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(Error::BadRequest(format!("Invalid vote value: {other}"))),
        }
    }
}

impl FromStr for VoteValue {
    type Err = Error;

    /// URL form: `for` or `against`
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "for" => Ok(VoteValue::Up),
            "against" => Ok(VoteValue::Down),
            other => Err(Error::BadRequest(format!("Invalid vote direction: {other}"))),
        }
    }
}

/// Cast, flip or withdraw `user_id`'s vote on a target and return the new rating.
///
/// Fails with [`Error::SelfVote`] when the user authored the target and with
/// [`Error::NotFound`] when the target does not exist; nothing is written in
/// either case.
pub async fn vote(
    pool: &DbPool,
    target: VoteTarget,
    target_id: i64,
    user_id: i64,
    value: VoteValue,
) -> Result<i64> {
    let mut tx = db::begin_write(pool).await?;

    let author_id: Option<i64> =
        sqlx::query_scalar(&format!("SELECT author_id FROM {} WHERE id = ?", target.table()))
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?;

    let author_id = author_id
        .ok_or_else(|| Error::NotFound(format!("{} {target_id} not found", target.noun())))?;

    if author_id == user_id {
        return Err(Error::SelfVote(target.noun()));
    }

    let existing: Option<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT id, value FROM {} WHERE {} = ? AND user_id = ?",
        target.vote_table(),
        target.foreign_key()
    ))
    .bind(target_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let value = value.as_i64();
    let delta = match existing {
        None => {
            sqlx::query(&format!(
                "INSERT INTO {} ({}, user_id, value) VALUES (?, ?, ?)",
                target.vote_table(),
                target.foreign_key()
            ))
            .bind(target_id)
            .bind(user_id)
            .bind(value)
            .execute(&mut *tx)
            .await?;
            value
        }
        Some((vote_id, old)) if old == value => {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", target.vote_table()))
                .bind(vote_id)
                .execute(&mut *tx)
                .await?;
            -old
        }
        Some((vote_id, old)) => {
            sqlx::query(&format!("UPDATE {} SET value = ? WHERE id = ?", target.vote_table()))
                .bind(value)
                .bind(vote_id)
                .execute(&mut *tx)
                .await?;
            value - old
        }
    };

    let rating: i64 = sqlx::query_scalar(&format!(
        "UPDATE {} SET rating = rating + ? WHERE id = ? RETURNING rating",
        target.table()
    ))
    .bind(delta)
    .bind(target_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(
        "User {} voted {:+} on {} {} (rating now {})",
        user_id,
        delta,
        target.noun(),
        target_id,
        rating
    );
    Ok(rating)
}

/// The user's current vote on a target, if any
pub async fn user_vote(
    pool: &DbPool,
    target: VoteTarget,
    target_id: i64,
    user_id: i64,
) -> Result<Option<VoteValue>> {
    let value: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT value FROM {} WHERE {} = ? AND user_id = ?",
        target.vote_table(),
        target.foreign_key()
    ))
    .bind(target_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    value.map(VoteValue::try_from).transpose()
}

/// The user's votes on several targets of one kind (batch loading for answer lists)
pub async fn user_votes(
    pool: &DbPool,
    target: VoteTarget,
    target_ids: &[i64],
    user_id: i64,
) -> Result<HashMap<i64, VoteValue>> {
    if target_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; target_ids.len()].join(",");
    let query_str = format!(
        "SELECT {fk}, value FROM {table} WHERE user_id = ? AND {fk} IN ({placeholders})",
        fk = target.foreign_key(),
        table = target.vote_table(),
    );

    let mut query = sqlx::query_as::<_, (i64, i64)>(&query_str).bind(user_id);
    for id in target_ids {
        query = query.bind(id);
    }

    query
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|(id, value)| Ok((id, VoteValue::try_from(value)?)))
        .collect()
}
