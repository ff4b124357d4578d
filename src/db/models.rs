use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub text: String,
    pub author_id: i64,
    pub rating: i64,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub title: String,
    pub text: String,
    pub author_id: i64,
    pub tags: Vec<String>,
}

/// Question row joined with what listings display next to it
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub text: String,
    pub author_id: i64,
    pub rating: i64,
    pub creation_date: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar: Option<String>,
    pub answers_num: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionWithTags {
    #[serde(flatten)]
    pub question: QuestionSummary,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub author_id: i64,
    pub is_correct: bool,
    pub rating: i64,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnswerWithAuthor {
    pub id: i64,
    pub question_id: i64,
    pub text: String,
    pub author_id: i64,
    pub is_correct: bool,
    pub rating: i64,
    pub creation_date: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnswer {
    pub question_id: i64,
    pub text: String,
    pub author_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub token_hash: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
