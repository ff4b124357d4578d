use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    api::models::*,
    auth::AuthUser,
    db::{
        self,
        models::{NewAnswer, NewQuestion},
        questions::{QuestionFilter, QuestionOrdering},
    },
    notify::Mailer,
    utils::validation,
    Error, Result,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub settings: crate::config::Settings,
    pub mailer: Arc<dyn Mailer>,
}

/// Resolve page/limit against the configured defaults and the row count
fn paginate(state: &AppState, page: usize, limit: Option<usize>, total: i64) -> Result<Pagination> {
    if page == 0 {
        return Err(Error::BadRequest("Invalid page".to_string()));
    }

    let limit = limit
        .unwrap_or(state.settings.pagination.api_page_size)
        .clamp(1, state.settings.pagination.api_max_limit);
    let total = total.max(0) as usize;
    let total_pages = total.div_ceil(limit);

    // An empty collection still has a first page
    if page > total_pages.max(1) {
        return Err(Error::NotFound("Invalid page".to_string()));
    }

    Ok(Pagination {
        page,
        limit,
        total,
        total_pages,
    })
}

/// GET /api/questions - List questions
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<QuestionListParams>,
) -> Result<Json<ListResponse<QuestionDetail>>> {
    debug!("List questions request: {:?}", params);

    let filter = match params.search.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => QuestionFilter::search(q),
        _ => QuestionFilter::default(),
    };
    let ordering = params
        .ordering
        .as_deref()
        .map(QuestionOrdering::parse)
        .unwrap_or_default();

    let total = db::questions::count_questions(&state.pool, &filter).await?;
    let pagination = paginate(&state, params.page, params.limit, total)?;
    let offset = (pagination.page - 1) * pagination.limit;

    let questions = db::questions::list_questions(
        &state.pool,
        &filter,
        &ordering,
        pagination.limit as i64,
        offset as i64,
    )
    .await?;

    Ok(Json(ListResponse {
        results: questions.into_iter().map(QuestionDetail::from).collect(),
        pagination,
    }))
}

/// POST /api/questions - Ask a question
pub async fn create_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: std::result::Result<Json<CreateQuestionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<QuestionDetail>)> {
    debug!("Create question request from {}", user.username);
    let Json(body) = body?;

    validation::validate_title(&body.title)?;
    validation::validate_text(&body.text)?;
    if body.tags.len() > validation::MAX_TAGS {
        return Err(Error::Validation(
            "Tags field must not contain more than three strings".to_string(),
        ));
    }
    let tags = validation::normalize_tags(&body.tags)?;

    let question = db::questions::create_question(
        &state.pool,
        &NewQuestion {
            title: body.title.trim().to_string(),
            text: body.text,
            author_id: user.id,
            tags,
        },
    )
    .await?;

    let created = db::questions::get_question_with_tags(&state.pool, question.id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /api/questions/:id - Get a question
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<QuestionDetail>> {
    debug!("Get question request: {}", id);

    let question = db::questions::get_question_with_tags(&state.pool, id).await?;
    Ok(Json(question.into()))
}

/// GET /api/questions/:id/answers - List answers, best first
pub async fn list_answers(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<ListResponse<AnswerDetail>>> {
    debug!("List answers request: question {} {:?}", question_id, params);

    db::questions::get_question(&state.pool, question_id).await?;

    let total = db::answers::count_answers(&state.pool, question_id).await?;
    let pagination = paginate(&state, params.page, params.limit, total)?;
    let offset = (pagination.page - 1) * pagination.limit;

    let answers = db::answers::list_answers(
        &state.pool,
        question_id,
        pagination.limit as i64,
        offset as i64,
    )
    .await?;

    Ok(Json(ListResponse {
        results: answers.into_iter().map(AnswerDetail::from).collect(),
        pagination,
    }))
}

/// POST /api/questions/:id/answers - Answer a question
pub async fn create_answer(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    AuthUser(user): AuthUser,
    body: std::result::Result<Json<CreateAnswerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AnswerDetail>)> {
    debug!("Create answer request: question {} by {}", question_id, user.username);
    let Json(body) = body?;

    validation::validate_text(&body.text)?;
    db::questions::get_question(&state.pool, question_id).await?;

    let answer = db::answers::create_answer(
        &state.pool,
        &NewAnswer {
            question_id,
            text: body.text,
            author_id: user.id,
        },
    )
    .await?;

    let created = db::answers::get_question_answer(&state.pool, question_id, answer.id).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /api/questions/:id/answers/:answer_id - Get an answer of a question
pub async fn get_answer(
    State(state): State<AppState>,
    Path((question_id, answer_id)): Path<(i64, i64)>,
) -> Result<Json<AnswerDetail>> {
    debug!("Get answer request: question {} answer {}", question_id, answer_id);

    let answer = db::answers::get_question_answer(&state.pool, question_id, answer_id).await?;
    Ok(Json(answer.into()))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// GET /ready - Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<ReadinessResponse>> {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    Ok(Json(ReadinessResponse {
        ready: db_healthy,
        database: if db_healthy { "ok" } else { "error" }.to_string(),
    }))
}
