use crate::db::{self, models::*, tags, DbPool};
use crate::error::{Error, Result};
use crate::utils::slug;
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

const SUMMARY_SELECT: &str = r#"
    SELECT q.id, q.title, q.slug, q.text, q.author_id, q.rating, q.creation_date,
           u.username AS author_username,
           u.avatar AS author_avatar,
           (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) AS answers_num
    FROM questions q
    JOIN users u ON u.id = q.author_id
"#;

/// Sortable question columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreationDate,
    Rating,
}

impl OrderField {
    fn column(self) -> &'static str {
        match self {
            OrderField::CreationDate => "q.creation_date",
            OrderField::Rating => "q.rating",
        }
    }
}

/// An ordering such as `-rating,-creation_date`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuestionOrdering(Vec<(OrderField, bool)>);

impl QuestionOrdering {
    /// Newest first
    pub fn new_first() -> Self {
        Self(vec![(OrderField::CreationDate, true)])
    }

    /// Highest rated first, newest first among equals
    pub fn hot() -> Self {
        Self(vec![(OrderField::Rating, true), (OrderField::CreationDate, true)])
    }

    /// Parse a comma-separated list of fields, each optionally prefixed with
    /// `-` for descending order. Unknown fields are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut fields = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            let (name, descending) = match part.strip_prefix('-') {
                Some(name) => (name, true),
                None => (part, false),
            };
            let field = match name {
                "creation_date" => OrderField::CreationDate,
                "rating" => OrderField::Rating,
                _ => continue,
            };
            if !fields.iter().any(|(f, _)| *f == field) {
                fields.push((field, descending));
            }
        }
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_sql(&self) -> String {
        if self.0.is_empty() {
            return "q.id ASC".to_string();
        }
        let mut clauses: Vec<String> = self
            .0
            .iter()
            .map(|(field, desc)| {
                format!("{} {}", field.column(), if *desc { "DESC" } else { "ASC" })
            })
            .collect();
        // Stable tie-break for rows sharing a timestamp
        let last_desc = self.0.last().map(|(_, desc)| *desc).unwrap_or(false);
        clauses.push(format!("q.id {}", if last_desc { "DESC" } else { "ASC" }));
        clauses.join(", ")
    }
}

/// Which questions a listing includes
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub tag_id: Option<i64>,
    pub search: Option<String>,
}

impl QuestionFilter {
    pub fn tagged(tag_id: i64) -> Self {
        Self {
            tag_id: Some(tag_id),
            search: None,
        }
    }

    pub fn search(query: &str) -> Self {
        Self {
            tag_id: None,
            search: Some(query.to_string()),
        }
    }

    fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(tag_id) = self.tag_id {
            conditions.push(
                "EXISTS(SELECT 1 FROM question_tags qt WHERE qt.question_id = q.id AND qt.tag_id = ?)"
                    .to_string(),
            );
            params.push(tag_id.to_string());
        }

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            conditions.push(
                r"(q.search_title LIKE ? ESCAPE '\' OR q.search_text LIKE ? ESCAPE '\')"
                    .to_string(),
            );
            // SQLite folds only ASCII case, so both sides are lowercased in Rust
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            params.push(pattern.clone());
            params.push(pattern);
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!("WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

/// Escape LIKE wildcards so the user's text is matched literally
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Find the first free slug for a title: the plain slug, then `-1`, `-2`, ...
pub async fn unique_slug(conn: &mut SqliteConnection, title: &str) -> Result<String> {
    let base = slug::slugify(title);
    let mut candidate = base.clone();
    let mut n: u64 = 0;

    loop {
        let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM questions WHERE slug = ?)")
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
        if !taken {
            return Ok(candidate);
        }
        n += 1;
        candidate = slug::with_suffix(&base, n);
    }
}

/// Create a question with its tags and a unique slug in one transaction
pub async fn create_question(pool: &DbPool, new_question: &NewQuestion) -> Result<Question> {
    let mut tx = db::begin_write(pool).await?;

    let slug = unique_slug(&mut tx, &new_question.title).await?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions
            (title, slug, text, author_id, rating, creation_date, search_title, search_text)
        VALUES (?, ?, ?, ?, 0, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_question.title)
    .bind(&slug)
    .bind(&new_question.text)
    .bind(new_question.author_id)
    .bind(Utc::now())
    .bind(new_question.title.to_lowercase())
    .bind(new_question.text.to_lowercase())
    .fetch_one(&mut *tx)
    .await?;

    tags::add_question_tags(&mut tx, question.id, &new_question.tags).await?;

    tx.commit().await?;

    debug!("Created question {} with slug {}", question.id, question.slug);
    Ok(question)
}

/// Get question by ID
pub async fn get_question(pool: &DbPool, question_id: i64) -> Result<Question> {
    sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(question_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question {question_id} not found")))
}

/// Get question (with author and tags) by ID
pub async fn get_question_with_tags(pool: &DbPool, question_id: i64) -> Result<QuestionWithTags> {
    let query = format!("{SUMMARY_SELECT} WHERE q.id = ?");
    let question = sqlx::query_as::<_, QuestionSummary>(&query)
        .bind(question_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question {question_id} not found")))?;
    let tags = tags::get_tags_for_question(pool, question.id).await?;

    Ok(QuestionWithTags { question, tags })
}

/// Get question (with author and tags) by slug
pub async fn get_question_by_slug(pool: &DbPool, slug: &str) -> Result<QuestionWithTags> {
    let query = format!("{SUMMARY_SELECT} WHERE q.slug = ?");
    let question = sqlx::query_as::<_, QuestionSummary>(&query)
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question {slug} not found")))?;
    let tags = tags::get_tags_for_question(pool, question.id).await?;

    Ok(QuestionWithTags { question, tags })
}

/// List a window of questions matching a filter, with their tags
pub async fn list_questions(
    pool: &DbPool,
    filter: &QuestionFilter,
    ordering: &QuestionOrdering,
    limit: i64,
    offset: i64,
) -> Result<Vec<QuestionWithTags>> {
    let (where_clause, params) = filter.where_clause();
    let query_str = format!(
        "{SUMMARY_SELECT} {where_clause} ORDER BY {} LIMIT ? OFFSET ?",
        ordering.to_sql()
    );

    let mut query = sqlx::query_as::<_, QuestionSummary>(&query_str);
    for param in &params {
        query = query.bind(param);
    }
    let questions = query.bind(limit).bind(offset).fetch_all(pool).await?;

    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let mut tags_map = tags::get_tags_for_questions(pool, &ids).await?;

    Ok(questions
        .into_iter()
        .map(|question| {
            let tags = tags_map.remove(&question.id).unwrap_or_default();
            QuestionWithTags { question, tags }
        })
        .collect())
}

/// Count questions matching a filter
pub async fn count_questions(pool: &DbPool, filter: &QuestionFilter) -> Result<i64> {
    let (where_clause, params) = filter.where_clause();
    let query_str = format!("SELECT COUNT(*) FROM questions q {where_clause}");

    let mut query = sqlx::query_scalar::<_, i64>(&query_str);
    for param in &params {
        query = query.bind(param);
    }
    Ok(query.fetch_one(pool).await?)
}

/// Top questions for the sidebar
pub async fn trending(pool: &DbPool, limit: i64) -> Result<Vec<Question>> {
    let questions = sqlx::query_as::<_, Question>(
        "SELECT * FROM questions ORDER BY rating DESC, creation_date DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(questions)
}
