use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tower_cookies::Cookies;
use tracing::{debug, info};

use super::pages::{self, PageLinks};
use crate::{
    api::handlers::AppState,
    auth::{self, password, session, MaybeUser},
    db::{
        self,
        models::{NewAnswer, NewQuestion, NewUser, Question, QuestionWithTags, User},
        questions::{QuestionFilter, QuestionOrdering},
        votes::{VoteTarget, VoteValue},
    },
    error::Error,
    notify,
    utils::validation,
    Result,
};

const DEFAULT_AVATAR: &str = "/static/avatar.svg";

fn render(template: impl Template) -> Result<Response> {
    Ok(Html(template.render().map_err(|e| {
        Error::Internal(format!("Template render failed: {e}"))
    })?)
    .into_response())
}

pub fn question_url(slug: &str) -> String {
    format!("/question/{}", urlencoding::encode(slug))
}

pub fn tag_url(name: &str) -> String {
    format!("/tag/{}", urlencoding::encode(name))
}

fn login_url(next: &str) -> String {
    format!("/login?next={}", urlencoding::encode(next))
}

fn login_redirect(next: &str) -> Response {
    Redirect::to(&login_url(next)).into_response()
}

/// Scheme and host used in links that leave the site (e-mails)
fn site_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.settings.server.external_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

/// What every page shows around its content
struct Layout {
    user: Option<User>,
    trending: Vec<TrendingLink>,
}

struct TrendingLink {
    title: String,
    url: String,
    rating: i64,
}

async fn layout(state: &AppState, user: Option<User>) -> Result<Layout> {
    let trending =
        db::questions::trending(&state.pool, state.settings.pagination.trending_size as i64)
            .await?
            .into_iter()
            .map(|q: Question| TrendingLink {
                url: question_url(&q.slug),
                title: q.title,
                rating: q.rating,
            })
            .collect();

    Ok(Layout { user, trending })
}

impl Layout {
    fn avatar(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.avatar.as_deref())
            .unwrap_or(DEFAULT_AVATAR)
    }
}

#[derive(Clone)]
struct TagLink {
    name: String,
    url: String,
}

fn tag_links(tags: Vec<String>) -> Vec<TagLink> {
    tags.into_iter()
        .map(|name| TagLink {
            url: tag_url(&name),
            name,
        })
        .collect()
}

#[derive(Clone)]
#[allow(dead_code)] // Fields are used by Askama templates
struct QuestionCard {
    id: i64,
    title: String,
    text: String,
    url: String,
    author: String,
    avatar: String,
    rating: i64,
    answers_num: i64,
    created: String,
    tags: Vec<TagLink>,
}

impl From<QuestionWithTags> for QuestionCard {
    fn from(q: QuestionWithTags) -> Self {
        let question = q.question;
        QuestionCard {
            id: question.id,
            url: question_url(&question.slug),
            title: question.title,
            text: question.text,
            author: question.author_username,
            avatar: question
                .author_avatar
                .unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            rating: question.rating,
            answers_num: question.answers_num,
            created: question.creation_date.format("%Y-%m-%d %H:%M").to_string(),
            tags: tag_links(q.tags),
        }
    }
}

#[derive(Deserialize)]
pub struct PageParams {
    page: Option<String>,
}

/// Listing page template (new, hot, tag and search results)
#[derive(Template)]
#[template(path = "listing.html")]
struct ListingTemplate {
    layout: Layout,
    heading: String,
    tab: &'static str,
    questions: Vec<QuestionCard>,
    links: PageLinks,
}

struct Listing {
    heading: String,
    tab: &'static str,
    filter: QuestionFilter,
    ordering: QuestionOrdering,
    base_url: String,
}

async fn render_listing(
    state: &AppState,
    user: Option<User>,
    listing: Listing,
    page: Option<&str>,
) -> Result<Response> {
    let per_page = state.settings.pagination.questions_per_page;
    let max_pages = state.settings.pagination.max_pages;
    let page = pages::parse_page(page, max_pages)?;

    let questions = db::questions::list_questions(
        &state.pool,
        &listing.filter,
        &listing.ordering,
        per_page as i64,
        pages::offset(page, per_page) as i64,
    )
    .await?;

    let links = PageLinks::new(&listing.base_url, page, max_pages, questions.len() == per_page);

    render(ListingTemplate {
        layout: layout(state, user).await?,
        heading: listing.heading,
        tab: listing.tab,
        questions: questions.into_iter().map(QuestionCard::from).collect(),
        links,
    })
}

/// GET / - Newest questions
pub async fn new_questions(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<PageParams>,
) -> Result<Response> {
    let listing = Listing {
        heading: "New questions".to_string(),
        tab: "new",
        filter: QuestionFilter::default(),
        ordering: QuestionOrdering::new_first(),
        base_url: "/".to_string(),
    };
    render_listing(&state, user, listing, params.page.as_deref()).await
}

/// GET /hot - Best rated questions
pub async fn hot_questions(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<PageParams>,
) -> Result<Response> {
    let listing = Listing {
        heading: "Hot questions".to_string(),
        tab: "hot",
        filter: QuestionFilter::default(),
        ordering: QuestionOrdering::hot(),
        base_url: "/hot".to_string(),
    };
    render_listing(&state, user, listing, params.page.as_deref()).await
}

/// GET /tag/:name - Questions with a tag
pub async fn tag_questions(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(name): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response> {
    let tag = db::tags::get_tag_by_name(&state.pool, &name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Tag {name} not found")))?;

    let listing = Listing {
        heading: format!("Tag: {}", tag.name),
        tab: "tag",
        filter: QuestionFilter::tagged(tag.id),
        ordering: QuestionOrdering::hot(),
        base_url: tag_url(&tag.name),
    };
    render_listing(&state, user, listing, params.page.as_deref()).await
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    page: Option<String>,
}

/// GET /search?q= - Substring search, or a redirect for `tag:name`
pub async fn search(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<SearchParams>,
) -> Result<Response> {
    let query = params.q.as_deref().unwrap_or_default().trim();
    if query.is_empty() {
        return Err(Error::BadRequest("Search query is required".to_string()));
    }

    if let Some(prefix) = query.get(..4) {
        if prefix.eq_ignore_ascii_case("tag:") {
            let name = query[4..].trim().to_lowercase();
            return Ok(Redirect::to(&tag_url(&name)).into_response());
        }
    }

    debug!("Search request: {:?}", query);

    let listing = Listing {
        heading: format!("Search results: {query}"),
        tab: "search",
        filter: QuestionFilter::search(query),
        ordering: QuestionOrdering::hot(),
        base_url: format!("/search?q={}", urlencoding::encode(query)),
    };
    render_listing(&state, user, listing, params.page.as_deref()).await
}

/// Question page template
#[derive(Template)]
#[template(path = "question.html")]
struct QuestionTemplate {
    layout: Layout,
    question: QuestionCard,
    question_vote: i64,
    is_author: bool,
    answers: Vec<AnswerCard>,
    links: PageLinks,
    answer_text: String,
    error: Option<String>,
    login_url: String,
}

#[derive(Clone)]
#[allow(dead_code)] // Fields are used by Askama templates
struct AnswerCard {
    id: i64,
    text: String,
    author: String,
    avatar: String,
    rating: i64,
    is_correct: bool,
    created: String,
    my_vote: i64,
}

async fn render_question(
    state: &AppState,
    user: Option<User>,
    slug: &str,
    page: Option<&str>,
    answer_text: String,
    error: Option<String>,
) -> Result<Response> {
    let per_page = state.settings.pagination.answers_per_page;
    let max_pages = state.settings.pagination.max_pages;
    let page = pages::parse_page(page, max_pages)?;

    let question = db::questions::get_question_by_slug(&state.pool, slug).await?;
    let answers = db::answers::list_answers(
        &state.pool,
        question.question.id,
        per_page as i64,
        pages::offset(page, per_page) as i64,
    )
    .await?;

    let (question_vote, answer_votes) = match &user {
        Some(user) => {
            let ids: Vec<i64> = answers.iter().map(|a| a.id).collect();
            (
                db::votes::user_vote(&state.pool, VoteTarget::Question, question.question.id, user.id)
                    .await?,
                db::votes::user_votes(&state.pool, VoteTarget::Answer, &ids, user.id).await?,
            )
        }
        None => (None, HashMap::new()),
    };

    let is_author = user.as_ref().map(|u| u.id) == Some(question.question.author_id);
    let links = PageLinks::new(
        &question_url(&question.question.slug),
        page,
        max_pages,
        answers.len() == per_page,
    );

    let answers = answers
        .into_iter()
        .map(|a| AnswerCard {
            my_vote: answer_votes.get(&a.id).map(|v| v.as_i64()).unwrap_or(0),
            id: a.id,
            text: a.text,
            author: a.author_username,
            avatar: a.author_avatar.unwrap_or_else(|| DEFAULT_AVATAR.to_string()),
            rating: a.rating,
            is_correct: a.is_correct,
            created: a.creation_date.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    let login_url = login_url(&question_url(&question.question.slug));

    render(QuestionTemplate {
        layout: layout(state, user).await?,
        login_url,
        question: question.into(),
        question_vote: question_vote.map(VoteValue::as_i64).unwrap_or(0),
        is_author,
        answers,
        links,
        answer_text,
        error,
    })
}

/// GET /question/:slug - Question with a window of its answers
pub async fn question_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Response> {
    render_question(&state, user, &slug, params.page.as_deref(), String::new(), None).await
}

#[derive(Deserialize)]
pub struct AnswerForm {
    #[serde(default)]
    text: String,
}

/// POST /question/:slug - Answer a question and notify its author
pub async fn post_answer(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AnswerForm>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(login_redirect(&question_url(&slug)));
    };

    let question = db::questions::get_question_by_slug(&state.pool, &slug).await?;

    if let Err(e) = validation::validate_text(&form.text) {
        return render_question(&state, Some(user), &slug, None, form.text, Some(e.public_message()))
            .await;
    }

    let answer = db::answers::create_answer(
        &state.pool,
        &NewAnswer {
            question_id: question.question.id,
            text: form.text,
            author_id: user.id,
        },
    )
    .await?;
    debug!("User {} answered question {} ({})", user.id, question.question.id, answer.id);

    let url = question_url(&question.question.slug);
    let author = db::users::get_user(&state.pool, question.question.author_id).await?;
    let email = notify::new_answer_email(
        &state.settings.mail,
        &author.email,
        &question.question.title,
        &format!("{}{}", site_url(&state, &headers), url),
    );
    notify::dispatch(state.mailer.clone(), email);

    Ok(Redirect::to(&url).into_response())
}

/// Ask page template
#[derive(Template)]
#[template(path = "ask.html")]
struct AskTemplate {
    layout: Layout,
    title: String,
    text: String,
    tags: String,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct AskForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    tags: String,
}

/// GET /ask - Question form
pub async fn ask_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Result<Response> {
    if user.is_none() {
        return Ok(login_redirect("/ask"));
    }

    render(AskTemplate {
        layout: layout(&state, user).await?,
        title: String::new(),
        text: String::new(),
        tags: String::new(),
        error: None,
    })
}

/// POST /ask - Create a question
pub async fn ask_submit(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<AskForm>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(login_redirect("/ask"));
    };

    let checked = validation::validate_title(&form.title)
        .and_then(|_| validation::validate_text(&form.text))
        .and_then(|_| validation::parse_tag_list(&form.tags));

    let tags = match checked {
        Ok(tags) => tags,
        Err(e) => {
            return render(AskTemplate {
                layout: layout(&state, Some(user)).await?,
                title: form.title,
                text: form.text,
                tags: form.tags,
                error: Some(e.public_message()),
            })
        }
    };

    let question = db::questions::create_question(
        &state.pool,
        &NewQuestion {
            title: form.title.trim().to_string(),
            text: form.text,
            author_id: user.id,
            tags,
        },
    )
    .await?;

    Ok(Redirect::to(&question_url(&question.slug)).into_response())
}

/// Signup page template
#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    layout: Layout,
    username: String,
    email: String,
    avatar: String,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password2: String,
    #[serde(default)]
    avatar: String,
}

/// GET /signup - Signup form
pub async fn signup_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Response> {
    render(SignupTemplate {
        layout: layout(&state, user).await?,
        username: String::new(),
        email: String::new(),
        avatar: String::new(),
        error: None,
    })
}

async fn check_signup(state: &AppState, form: &SignupForm) -> Result<()> {
    validation::validate_username(&form.username)?;
    validation::validate_email(&form.email)?;
    validation::validate_signup_passwords(&form.username, &form.password, &form.password2)?;
    if !form.avatar.trim().is_empty() {
        validation::validate_avatar_url(form.avatar.trim())?;
    }

    if db::users::username_exists(&state.pool, &form.username).await? {
        return Err(Error::Validation(
            "A user with that username already exists".to_string(),
        ));
    }
    if db::users::email_exists(&state.pool, &form.email, None).await? {
        return Err(Error::Validation("This email is already in use".to_string()));
    }
    Ok(())
}

async fn signup_error(state: &AppState, form: SignupForm, message: String) -> Result<Response> {
    render(SignupTemplate {
        layout: layout(state, None).await?,
        username: form.username,
        email: form.email,
        avatar: form.avatar,
        error: Some(message),
    })
}

/// POST /signup - Register and log in
pub async fn signup_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<SignupForm>,
) -> Result<Response> {
    match check_signup(&state, &form).await {
        Ok(()) => {}
        Err(Error::Validation(message)) => return signup_error(&state, form, message).await,
        Err(e) => return Err(e),
    }

    let password_hash = password::hash_password(form.password.clone())
        .await
        .map_err(|e| Error::Internal(format!("Password hashing failed: {e}")))?;

    let avatar = Some(form.avatar.trim().to_string()).filter(|a| !a.is_empty());
    let created = db::users::create_user(
        &state.pool,
        &NewUser {
            username: form.username.clone(),
            email: form.email.clone(),
            password_hash,
            avatar,
        },
    )
    .await;

    let user = match created {
        Ok(user) => user,
        // Lost a race against a concurrent signup with the same name or email
        Err(Error::Database(ref e)) if db::is_unique_violation(e) => {
            let message = "A user with that username or email already exists".to_string();
            return signup_error(&state, form, message).await;
        }
        Err(e) => return Err(e),
    };

    info!("New user registered: {}", user.username);
    session::start(&state.pool, &cookies, &state.settings.auth, user.id).await?;

    Ok(Redirect::to("/").into_response())
}

/// Login page template
#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    layout: Layout,
    username: String,
    next: String,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginParams {
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    next: Option<String>,
}

/// GET /login - Login form
pub async fn login_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<LoginParams>,
) -> Result<Response> {
    render(LoginTemplate {
        layout: layout(&state, user).await?,
        username: String::new(),
        next: validation::safe_next_path(params.next.as_deref()),
        error: None,
    })
}

/// POST /login - Check credentials and start a session
pub async fn login_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let next = validation::safe_next_path(form.next.as_deref());

    match auth::authenticate(&state.pool, &form.username, &form.password).await? {
        Some(user) => {
            session::start(&state.pool, &cookies, &state.settings.auth, user.id).await?;
            debug!("User {} logged in", user.username);
            Ok(Redirect::to(&next).into_response())
        }
        None => render(LoginTemplate {
            layout: layout(&state, None).await?,
            username: form.username,
            next,
            error: Some("Incorrect username/password".to_string()),
        }),
    }
}

/// POST /logout - End the session
pub async fn logout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    cookies: Cookies,
) -> Result<Response> {
    if user.is_none() {
        return Ok(login_redirect("/"));
    }

    session::end(&state.pool, &cookies).await?;
    Ok(Redirect::to("/").into_response())
}

/// Settings page template
#[derive(Template)]
#[template(path = "settings.html")]
struct SettingsTemplate {
    layout: Layout,
    email: String,
    avatar: String,
    error: Option<String>,
    saved: bool,
}

#[derive(Deserialize)]
pub struct SettingsParams {
    saved: Option<String>,
}

#[derive(Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    avatar: String,
}

/// GET /settings - Profile settings form
pub async fn settings_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(params): Query<SettingsParams>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(login_redirect("/settings"));
    };

    render(SettingsTemplate {
        email: user.email.clone(),
        avatar: user.avatar.clone().unwrap_or_default(),
        layout: layout(&state, Some(user)).await?,
        error: None,
        saved: params.saved.is_some(),
    })
}

/// POST /settings - Change e-mail and avatar
pub async fn settings_submit(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(form): Form<SettingsForm>,
) -> Result<Response> {
    let Some(user) = user else {
        return Ok(login_redirect("/settings"));
    };

    let email = form.email.trim().to_string();
    let avatar = form.avatar.trim().to_string();

    let mut checked = validation::validate_email(&email);
    if checked.is_ok() && !avatar.is_empty() {
        checked = validation::validate_avatar_url(&avatar);
    }
    if checked.is_ok() && db::users::email_exists(&state.pool, &email, Some(user.id)).await? {
        checked = Err(Error::Validation("This email is already in use".to_string()));
    }

    if let Err(e) = checked {
        return render(SettingsTemplate {
            layout: layout(&state, Some(user)).await?,
            email: form.email,
            avatar: form.avatar,
            error: Some(e.public_message()),
            saved: false,
        });
    }

    let avatar = Some(avatar.as_str()).filter(|a| !a.is_empty());
    db::users::update_settings(&state.pool, user.id, &email, avatar).await?;

    Ok(Redirect::to("/settings?saved=1").into_response())
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

async fn cast_vote(
    state: &AppState,
    user: Option<User>,
    target: VoteTarget,
    target_id: i64,
    value: &str,
) -> Result<Response> {
    let Some(user) = user else {
        return Err(Error::Forbidden("Login required".to_string()));
    };

    let author_id = match target {
        VoteTarget::Question => db::questions::get_question(&state.pool, target_id).await?.author_id,
        VoteTarget::Answer => db::answers::get_answer(&state.pool, target_id).await?.author_id,
    };
    if author_id == user.id {
        return Ok(json_error(StatusCode::OK, Error::SelfVote(target.noun()).to_string()));
    }

    let value: VoteValue = value.parse()?;
    match db::votes::vote(&state.pool, target, target_id, user.id, value).await {
        Ok(rating) => Ok(Json(json!({ "status": "ok", "rating": rating })).into_response()),
        Err(e @ Error::SelfVote(_)) => Ok(json_error(StatusCode::OK, e.to_string())),
        Err(e) => Err(e),
    }
}

/// POST /vote-question/:id/:value - Toggle a vote on a question
pub async fn vote_question(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path((id, value)): Path<(i64, String)>,
) -> Result<Response> {
    cast_vote(&state, user, VoteTarget::Question, id, &value).await
}

/// POST /vote-answer/:id/:value - Toggle a vote on an answer
pub async fn vote_answer(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path((id, value)): Path<(i64, String)>,
) -> Result<Response> {
    cast_vote(&state, user, VoteTarget::Answer, id, &value).await
}

/// POST /mark-answer/:id - Choose the correct answer of one's own question
pub async fn mark_answer(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let Some(user) = user else {
        return Err(Error::Forbidden("Login required".to_string()));
    };

    match db::answers::mark_correct(&state.pool, id, user.id).await {
        Ok(()) => Ok(Json(json!({ "status": "ok" })).into_response()),
        Err(e @ Error::NotQuestionAuthor) => Ok(json_error(StatusCode::FORBIDDEN, e.to_string())),
        Err(e) => Err(e),
    }
}
