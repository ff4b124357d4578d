use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use qanda::{
    api::{handlers::AppState, routes},
    db,
    notify::{Email, Mailer},
    Settings,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer(Mutex<Vec<Email>>);

impl Mailer for RecordingMailer {
    fn send(&self, email: &Email) -> qanda::Result<()> {
        self.0.lock().unwrap().push(email.clone());
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

async fn setup() -> TestApp {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState {
        pool,
        settings: Settings::for_tests(),
        mailer: mailer.clone(),
    };
    let router = routes::create_router(state.clone(), &state.settings);
    TestApp {
        router,
        state,
        mailer,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, session: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = session {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, form: &str, session: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::HOST, "example.com")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = session {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    /// Sign up and return the session cookie
    async fn signup(&self, username: &str) -> String {
        let form = format!(
            "username={username}&email={username}%40example.com&password=secret-42&password2=secret-42"
        );
        let response = self.post_form("/signup", &form, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
        session_cookie(&response).expect("signup sets a session cookie")
    }
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("sessionid="))
        .map(|v| v.split(';').next().unwrap_or(v).to_string())
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_ask_answer_vote_and_mark() {
    let app = setup().await;
    let bob = app.signup("bob").await;
    let alice = app.signup("alice").await;

    // Identical titles get suffixed slugs
    for expected in ["/question/wtf", "/question/wtf-1"] {
        let response = app
            .post_form("/ask", "title=WTF&text=What+is+this%3F&tags=Rust%2C+sqlx", Some(&bob))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], expected);
    }

    let question = db::questions::get_question_by_slug(&app.state.pool, "wtf-1")
        .await
        .unwrap();
    assert_eq!(question.tags, vec!["rust".to_string(), "sqlx".to_string()]);
    let qid = question.question.id;

    // Answering notifies the question author
    let response = app
        .post_form("/question/wtf-1", "text=My+answer", Some(&alice))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/question/wtf-1");

    let mut delivered = Vec::new();
    for _ in 0..50 {
        delivered = app.mailer.0.lock().unwrap().clone();
        if !delivered.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].to, "bob@example.com");
    assert!(delivered[0]
        .html
        .as_deref()
        .unwrap()
        .contains("http://example.com/question/wtf-1"));

    let answers = db::answers::list_answers(&app.state.pool, qid, 30, 0)
        .await
        .unwrap();
    assert_eq!(answers.len(), 1);
    let aid = answers[0].id;

    // Toggle voting
    let vote_uri = format!("/vote-question/{qid}/for");
    let body = body_json(app.post_form(&vote_uri, "", Some(&alice)).await).await;
    assert_eq!(body, serde_json::json!({"status": "ok", "rating": 1}));
    let body = body_json(app.post_form(&vote_uri, "", Some(&alice)).await).await;
    assert_eq!(body["rating"], 0);
    let body = body_json(
        app.post_form(&format!("/vote-question/{qid}/against"), "", Some(&alice))
            .await,
    )
    .await;
    assert_eq!(body["rating"], -1);

    // Voting on one's own content is refused with a JSON error
    let response = app.post_form(&vote_uri, "", Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "You cannot vote for your question");

    let response = app
        .post_form(&format!("/vote-answer/{aid}/for"), "", Some(&alice))
        .await;
    assert_eq!(body_json(response).await["message"], "You cannot vote for your answer");

    let response = app
        .post_form(&format!("/vote-answer/{aid}/sideways"), "", Some(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_form("/vote-answer/9999/for", "", Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Only the question author picks the correct answer
    let response = app
        .post_form(&format!("/mark-answer/{aid}"), "", Some(&alice))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["status"], "error");

    let response = app.post_form(&format!("/mark-answer/{aid}"), "", Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({"status": "ok"}));
    assert!(db::answers::get_answer(&app.state.pool, aid).await.unwrap().is_correct);

    // The question page shows the answer and the listings show the question
    let page = body_text(app.get("/question/wtf-1", Some(&bob)).await).await;
    assert!(page.contains("My answer"));
    // (every page lists trending titles, so count result cards instead)
    let page = body_text(app.get("/tag/rust", None).await).await;
    assert_eq!(page.matches("class=\"question-card\"").count(), 2);
    let page = body_text(app.get("/search?q=what+is", None).await).await;
    assert_eq!(page.matches("class=\"question-card\"").count(), 2);
    let page = body_text(app.get("/search?q=nothing+like+it", None).await).await;
    assert_eq!(page.matches("class=\"question-card\"").count(), 0);
}

#[tokio::test]
async fn test_signup_validation_and_login() {
    let app = setup().await;

    // Weak password re-renders the form
    let response = app
        .post_form(
            "/signup",
            "username=carol&email=carol%40example.com&password=password&password2=password",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
    assert!(body_text(response).await.contains("at least two"));

    let bob = app.signup("bob").await;

    // Taken username
    let response = app
        .post_form(
            "/signup",
            "username=bob&email=other%40example.com&password=secret-42&password2=secret-42",
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("already exists"));

    // Logout kills the session
    let response = app.post_form("/logout", "", Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let response = app.get("/ask", Some(&bob)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .starts_with("/login"));

    // Wrong password
    let response = app
        .post_form("/login", "username=bob&password=nope-nope-1", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Incorrect username"));

    // Login honours a same-site next path, but not an external one
    let response = app
        .post_form("/login", "username=bob&password=secret-42&next=%2Fask", None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/ask");
    let session = session_cookie(&response).unwrap();
    assert_eq!(app.get("/ask", Some(&session)).await.status(), StatusCode::OK);

    let response = app
        .post_form(
            "/login",
            "username=bob&password=secret-42&next=https%3A%2F%2Fevil.example",
            None,
        )
        .await;
    assert_eq!(response.headers()[header::LOCATION], "/");
}

#[tokio::test]
async fn test_settings_and_ask_validation() {
    let app = setup().await;
    let bob = app.signup("bob").await;
    app.signup("alice").await;

    // Email owned by someone else
    let response = app
        .post_form("/settings", "email=alice%40example.com&avatar=", Some(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("already in use"));

    let response = app
        .post_form(
            "/settings",
            "email=bob2%40example.com&avatar=https%3A%2F%2Fexample.com%2Fbob.png",
            Some(&bob),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let user = db::users::get_user_by_username(&app.state.pool, "bob")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.email, "bob2@example.com");
    assert_eq!(user.avatar.as_deref(), Some("https://example.com/bob.png"));

    // More than three tags
    let response = app
        .post_form("/ask", "title=T&text=X&tags=a%2Cb%2Cc%2Cd", Some(&bob))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("no more than three tags"));
    assert_eq!(
        db::questions::count_questions(&app.state.pool, &Default::default())
            .await
            .unwrap(),
        0
    );
}
