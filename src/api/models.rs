use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{AnswerWithAuthor, QuestionWithTags};

/// Question list query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionListParams {
    #[serde(default)]
    pub ordering: Option<String>, // e.g. "-rating,-creation_date"
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Answer list query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_page() -> usize {
    1
}

/// Paginated list response
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    pub pagination: Pagination,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Question as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub author: String,
    pub tags: Vec<String>,
    pub rating: i64,
    pub creation_date: DateTime<Utc>,
}

impl From<QuestionWithTags> for QuestionDetail {
    fn from(q: QuestionWithTags) -> Self {
        Self {
            id: q.question.id,
            title: q.question.title,
            text: q.question.text,
            author: q.question.author_username,
            tags: q.tags,
            rating: q.question.rating,
            creation_date: q.question.creation_date,
        }
    }
}

/// Answer as exposed by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub rating: i64,
    pub is_correct: bool,
    pub creation_date: DateTime<Utc>,
}

impl From<AnswerWithAuthor> for AnswerDetail {
    fn from(a: AnswerWithAuthor) -> Self {
        Self {
            id: a.id,
            text: a.text,
            author: a.author_username,
            rating: a.rating,
            is_correct: a.is_correct,
            creation_date: a.creation_date,
        }
    }
}

/// POST /api/questions body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestionRequest {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// POST /api/questions/:id/answers body
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnswerRequest {
    pub text: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: String,
}
