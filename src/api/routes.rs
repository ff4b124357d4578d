use axum::http::{header, HeaderValue, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

#[cfg(not(test))]
use {
    axum::extract::ConnectInfo,
    std::net::{IpAddr, SocketAddr},
    std::sync::Arc,
    tower_governor::{governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorLayer},
};

use crate::api::handlers::{self as api_handlers, AppState};
use crate::config::Settings;
use crate::web::handlers as web_handlers;

/// Create the router with all endpoints (API + Web UI)
#[cfg_attr(test, allow(unused_variables))]
pub fn create_router(state: AppState, settings: &Settings) -> Router {
    // REST API: reads are public, writes need a session or Basic credentials
    #[cfg_attr(test, allow(unused_mut))]
    let mut api_routes = Router::new()
        .route(
            "/questions",
            get(api_handlers::list_questions).post(api_handlers::create_question),
        )
        .route("/questions/:id", get(api_handlers::get_question))
        .route(
            "/questions/:id/answers",
            get(api_handlers::list_answers).post(api_handlers::create_answer),
        )
        .route("/questions/:id/answers/:answer_id", get(api_handlers::get_answer))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
                .allow_origin(tower_http::cors::Any)
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state.clone());

    // Rate limiting is keyed on the peer IP, falling back to localhost when
    // the connection info is unavailable. Behind a reverse proxy every client
    // shares the proxy's address.
    #[cfg(not(test))]
    {
        #[derive(Clone, Copy, Debug)]
        struct FallbackIpKeyExtractor;

        impl KeyExtractor for FallbackIpKeyExtractor {
            type Key = IpAddr;

            fn extract<B>(
                &self,
                req: &axum::http::Request<B>,
            ) -> Result<Self::Key, tower_governor::GovernorError> {
                if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
                    return Ok(addr.ip());
                }
                Ok(IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)))
            }
        }

        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(FallbackIpKeyExtractor)
                .per_second(settings.server.api_rate_limit)
                .burst_size(settings.server.api_rate_limit as u32 * 2)
                .finish()
                .expect("rate limit is validated to be non-zero"),
        );
        api_routes = api_routes.layer(GovernorLayer {
            config: governor_conf,
        });
    }

    let api_routes = api_routes;

    // Web UI routes
    let web_routes = Router::new()
        .route("/", get(web_handlers::new_questions))
        .route("/hot", get(web_handlers::hot_questions))
        .route(
            "/signup",
            get(web_handlers::signup_page).post(web_handlers::signup_submit),
        )
        .route(
            "/login",
            get(web_handlers::login_page).post(web_handlers::login_submit),
        )
        .route("/logout", post(web_handlers::logout))
        .route(
            "/settings",
            get(web_handlers::settings_page).post(web_handlers::settings_submit),
        )
        .route("/ask", get(web_handlers::ask_page).post(web_handlers::ask_submit))
        .route(
            "/question/:slug",
            get(web_handlers::question_page).post(web_handlers::post_answer),
        )
        .route("/tag/:name", get(web_handlers::tag_questions))
        .route("/search", get(web_handlers::search))
        .route("/mark-answer/:id", post(web_handlers::mark_answer))
        .route("/vote-question/:id/:value", post(web_handlers::vote_question))
        .route("/vote-answer/:id/:value", post(web_handlers::vote_answer))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(api_handlers::health_check))
        .route("/ready", get(api_handlers::readiness_check))
        .with_state(state.clone());

    let static_routes = Router::new().nest_service("/static", ServeDir::new("src/web/static"));

    Router::new()
        .merge(web_routes)
        .merge(health_routes)
        .merge(static_routes)
        .nest("/api", api_routes)
        .layer(CookieManagerLayer::new())
        .layer(
            // Request body size limit - prevent memory exhaustion from large payloads
            RequestBodyLimitLayer::new(settings.server.max_request_body_size),
        )
        .layer(
            // Security headers
            SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        )
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(
                "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data: https:; object-src 'none'; base-uri 'self'; form-action 'self'",
            ),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("same-origin"),
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password;
    use crate::db::{self, models::NewUser};
    use crate::notify::LogMailer;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn create_test_state() -> AppState {
        AppState {
            pool: db::testing::pool().await,
            settings: Settings::for_tests(),
            mailer: Arc::new(LogMailer),
        }
    }

    async fn app() -> (Router, AppState) {
        let state = create_test_state().await;
        (create_router(state.clone(), &state.settings), state)
    }

    async fn user_with_password(state: &AppState, username: &str, password: &str) -> i64 {
        let hash = password::hash_password(password.to_string()).await.unwrap();
        db::users::create_user(
            &state.pool,
            &NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: hash,
                avatar: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
    }

    async fn get(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_routes_exist() {
        let (app, _) = app().await;

        assert_eq!(get(&app, "/health").await.status(), StatusCode::OK);
        let ready = get(&app, "/ready").await;
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["ready"], true);
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let (app, _) = app().await;

        for uri in ["/", "/hot", "/?page=5", "/login", "/signup"] {
            assert_eq!(get(&app, uri).await.status(), StatusCode::OK, "{uri}");
        }
        assert_eq!(get(&app, "/?page=abc").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get(&app, "/hot?page=6").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/hot?page=0").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/tag/nothing").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(&app, "/question/nothing").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_routes() {
        let (app, _) = app().await;

        assert_eq!(get(&app, "/search").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get(&app, "/search?q=%20").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get(&app, "/search?q=rust").await.status(), StatusCode::OK);

        let response = get(&app, "/search?q=TAG:%20Rust").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/tag/rust");
    }

    #[tokio::test]
    async fn test_login_required_pages_redirect() {
        let (app, _) = app().await;

        let response = get(&app, "/ask").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login?next=%2Fask");

        let response = get(&app, "/settings").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_anonymous_question_page_links_to_login() {
        let (app, state) = app().await;
        let bob = db::testing::user(&state.pool, "bob").await;
        db::questions::create_question(&state.pool, &db::testing::new_question("Hello", bob.id, &[]))
            .await
            .unwrap();

        let response = get(&app, "/question/hello").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();

        // Askama escapes '/' in attributes
        assert!(html.contains("login?next=%2Fquestion%2Fhello\">Log in</a> to answer"));
        assert_eq!(html.matches("login?next=").count(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_vote_is_forbidden() {
        let (app, state) = app().await;
        let bob = db::testing::user(&state.pool, "bob").await;
        let q = db::questions::create_question(
            &state.pool,
            &db::testing::new_question("Q", bob.id, &[]),
        )
        .await
        .unwrap();

        for uri in [
            format!("/vote-question/{}/for", q.id),
            "/mark-answer/1".to_string(),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }

        // Votes are POST only
        let response = get(&app, &format!("/vote-question/{}/for", q.id)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_api_create_question() {
        let (app, state) = app().await;
        user_with_password(&state, "bob", "secret-42").await;

        let body = r#"{"title": "How?", "text": "Tell me", "tags": ["Rust", "sqlx"]}"#;
        let request = |auth: Option<String>| {
            let mut builder = Request::builder()
                .method("POST")
                .uri("/api/questions")
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(auth) = auth {
                builder = builder.header(header::AUTHORIZATION, auth);
            }
            builder.body(Body::from(body)).unwrap()
        };

        let response = app.clone().oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let response = app
            .clone()
            .oneshot(request(Some(basic("bob", "wrong-password"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(request(Some(basic("bob", "secret-42"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["author"], "bob");
        assert_eq!(created["rating"], 0);
        assert_eq!(created["tags"], serde_json::json!(["rust", "sqlx"]));

        let id = created["id"].as_i64().unwrap();
        let response = get(&app, &format!("/api/questions/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["title"], "How?");
    }

    #[tokio::test]
    async fn test_api_rejects_too_many_tags() {
        let (app, state) = app().await;
        user_with_password(&state, "bob", "secret-42").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/questions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, basic("bob", "secret-42"))
                    .body(Body::from(
                        r#"{"title": "T", "text": "X", "tags": ["a", "b", "c", "d"]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("three"));
    }

    #[tokio::test]
    async fn test_api_malformed_bodies_are_json_errors() {
        let (app, state) = app().await;
        let bob = user_with_password(&state, "bob", "secret-42").await;
        let question = db::questions::create_question(
            &state.pool,
            &db::testing::new_question("Hello", bob, &[]),
        )
        .await
        .unwrap();

        let answers_uri = format!("/api/questions/{}/answers", question.id);
        let cases = [
            ("/api/questions", "{not json"),
            ("/api/questions", r#"{"text": "no title"}"#),
            (answers_uri.as_str(), r#"{"body": "wrong field"}"#),
        ];
        for (uri, body) in cases {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header(header::CONTENT_TYPE, "application/json")
                        .header(header::AUTHORIZATION, basic("bob", "secret-42"))
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
            assert!(json_body(response).await["error"].is_string(), "{uri} {body}");
        }
    }

    #[tokio::test]
    async fn test_api_missing_resources() {
        let (app, state) = app().await;
        let bob = db::testing::user(&state.pool, "bob").await;
        let q1 = db::questions::create_question(&state.pool, &db::testing::new_question("A", bob.id, &[]))
            .await
            .unwrap();
        let q2 = db::questions::create_question(&state.pool, &db::testing::new_question("B", bob.id, &[]))
            .await
            .unwrap();
        let answer = db::answers::create_answer(
            &state.pool,
            &db::models::NewAnswer {
                question_id: q1.id,
                text: "yes".to_string(),
                author_id: bob.id,
            },
        )
        .await
        .unwrap();

        assert_eq!(get(&app, "/api/questions/999").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            get(&app, "/api/questions/999/answers").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get(&app, &format!("/api/questions/{}/answers/{}", q1.id, answer.id))
                .await
                .status(),
            StatusCode::OK
        );
        assert_eq!(
            get(&app, &format!("/api/questions/{}/answers/{}", q2.id, answer.id))
                .await
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_api_ordering_and_search() {
        let (app, state) = app().await;
        let bob = db::testing::user(&state.pool, "bob").await;
        for (title, rating) in [("Low rust", -1), ("High", 5), ("Mid rust", 2), ("Also mid", 2)] {
            let q = db::questions::create_question(
                &state.pool,
                &db::testing::new_question(title, bob.id, &[]),
            )
            .await
            .unwrap();
            sqlx::query("UPDATE questions SET rating = ? WHERE id = ?")
                .bind(rating)
                .bind(q.id)
                .execute(&state.pool)
                .await
                .unwrap();
        }

        let body = json_body(get(&app, "/api/questions?ordering=-rating,-creation_date").await).await;
        let titles: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["High", "Also mid", "Mid rust", "Low rust"]);
        assert_eq!(body["pagination"]["total"], 4);

        let body = json_body(get(&app, "/api/questions?search=RUST&ordering=rating").await).await;
        let titles: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Low rust", "Mid rust"]);

        let body = json_body(get(&app, "/api/questions?limit=3&page=2").await).await;
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["pagination"]["total_pages"], 2);

        assert_eq!(
            get(&app, "/api/questions?limit=3&page=3").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
