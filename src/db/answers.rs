use crate::db::{self, models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;
use tracing::debug;

const ANSWER_SELECT: &str = r#"
    SELECT a.id, a.question_id, a.text, a.author_id, a.is_correct, a.rating, a.creation_date,
           u.username AS author_username,
           u.avatar AS author_avatar
    FROM answers a
    JOIN users u ON u.id = a.author_id
"#;

/// Create a new answer
pub async fn create_answer(pool: &DbPool, new_answer: &NewAnswer) -> Result<Answer> {
    let answer = sqlx::query_as::<_, Answer>(
        r#"
        INSERT INTO answers (question_id, text, author_id, is_correct, rating, creation_date)
        VALUES (?, ?, ?, 0, 0, ?)
        RETURNING *
        "#,
    )
    .bind(new_answer.question_id)
    .bind(&new_answer.text)
    .bind(new_answer.author_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(answer)
}

/// Get answer by ID
pub async fn get_answer(pool: &DbPool, answer_id: i64) -> Result<Answer> {
    sqlx::query_as::<_, Answer>("SELECT * FROM answers WHERE id = ?")
        .bind(answer_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Answer {answer_id} not found")))
}

/// Get an answer only if it belongs to the given question
pub async fn get_question_answer(
    pool: &DbPool,
    question_id: i64,
    answer_id: i64,
) -> Result<AnswerWithAuthor> {
    let query = format!("{ANSWER_SELECT} WHERE a.id = ? AND a.question_id = ?");
    sqlx::query_as::<_, AnswerWithAuthor>(&query)
        .bind(answer_id)
        .bind(question_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Answer {answer_id} not found")))
}

/// List answers of a question, best rated first
pub async fn list_answers(
    pool: &DbPool,
    question_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<AnswerWithAuthor>> {
    let query = format!(
        "{ANSWER_SELECT} WHERE a.question_id = ? \
         ORDER BY a.rating DESC, a.creation_date DESC, a.id DESC LIMIT ? OFFSET ?"
    );
    let answers = sqlx::query_as::<_, AnswerWithAuthor>(&query)
        .bind(question_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(answers)
}

pub async fn count_answers(pool: &DbPool, question_id: i64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answers WHERE question_id = ?")
        .bind(question_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Mark an answer as the correct one for its question.
///
/// Only the question's author may do this. Any previously marked answer of
/// the same question is cleared in the same transaction, so at most one
/// answer per question is ever correct.
pub async fn mark_correct(pool: &DbPool, answer_id: i64, user_id: i64) -> Result<()> {
    let mut tx = db::begin_write(pool).await?;

    let row: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT a.question_id, q.author_id
        FROM answers a
        JOIN questions q ON q.id = a.question_id
        WHERE a.id = ?
        "#,
    )
    .bind(answer_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (question_id, question_author) =
        row.ok_or_else(|| Error::NotFound(format!("Answer {answer_id} not found")))?;

    if question_author != user_id {
        return Err(Error::NotQuestionAuthor);
    }

    sqlx::query("UPDATE answers SET is_correct = 0 WHERE question_id = ? AND is_correct = 1")
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE answers SET is_correct = 1 WHERE id = ?")
        .bind(answer_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    debug!("Answer {} marked correct for question {}", answer_id, question_id);
    Ok(())
}
