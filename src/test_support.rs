//! Database-backed test harness.
//!
//! Tests built on [`TestDb`] need `DATABASE_URL` to point at a disposable
//! PostgreSQL database. Without it they log a note and return early, so the
//! rest of the suite still runs on machines without a database.
//!
//! Every test works inside its own namespace: its users get emails under
//! `@<test-name>.example.com`, and deleting those users removes everything
//! else they own through the cascades.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json as DbJson;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use crate::auth::jwt::create_access_token;
use crate::auth::rate_limit::RateLimitState;
use crate::config::Config;
use crate::models::user::UserSettings;
use crate::routes::build_router;
use crate::AppState;

pub struct TestDb {
    pub pool: PgPool,
    config: Config,
    email_domain: String,
}

pub struct TestUser {
    pub id: Uuid,
    pub bearer: String,
}

impl TestDb {
    /// Connect, migrate and clear leftovers of an earlier run of `test_name`.
    ///
    /// `test_name` should be the test function's name so rows can be traced
    /// back to the test that wrote them.
    pub async fn new(test_name: &str) -> Option<Self> {
        dotenvy::dotenv().ok();

        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("skipping {test_name}: DATABASE_URL is not set");
            return None;
        };

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        let mut config = Config::for_tests();
        config.database_url = database_url;

        let label: String = test_name.replace('_', "-").chars().take(63).collect();
        let test_db = Self {
            pool,
            config,
            email_domain: format!("{}.example.com", label.trim_end_matches('-')),
        };
        test_db.cleanup().await;
        Some(test_db)
    }

    /// Full router on top of the test pool.
    pub fn app(&self) -> Router {
        build_router(AppState {
            db: self.pool.clone(),
            config: Arc::new(self.config.clone()),
            rate_limiter: RateLimitState::new(
                self.config.rate_limit_max_requests,
                self.config.rate_limit_window_secs,
            ),
        })
    }

    /// Email inside this test's namespace.
    pub fn email(&self, label: &str) -> String {
        let unique = Uuid::new_v4().simple().to_string();
        format!("{label}-{}@{}", &unique[..12], self.email_domain)
    }

    /// Insert a user directly and mint an access token for it.
    pub async fn seed_user(&self) -> TestUser {
        let id = Uuid::new_v4();
        let email = self.email("user");

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, settings) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind("Test User")
        .bind(&email)
        .bind("not-a-real-hash")
        .bind(DbJson(UserSettings::default()))
        .execute(&self.pool)
        .await
        .expect("Failed to seed user");

        let token = create_access_token(id, &email, &self.config).expect("Failed to sign token");
        TestUser {
            id,
            bearer: format!("Bearer {token}"),
        }
    }

    pub async fn count(&self, sql: &str, id: Uuid) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count rows")
    }

    /// Remove every user of this namespace; their data cascades.
    pub async fn cleanup(&self) {
        sqlx::query("DELETE FROM users WHERE email LIKE $1")
            .bind(format!("%@{}", self.email_domain))
            .execute(&self.pool)
            .await
            .expect("Failed to clean up test data");
    }
}

/// Send one request through the router and decode the JSON body.
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(header::HeaderName, String)],
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

/// Shorthand for an authenticated request.
pub async fn send_as(
    app: &Router,
    user: &TestUser,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, json) = send(
        app,
        method,
        uri,
        &[(header::AUTHORIZATION, user.bearer.clone())],
        body,
    )
    .await;
    (status, json)
}

/// Create a habit over HTTP and return its id.
pub async fn create_habit(app: &Router, user: &TestUser, title: &str) -> Uuid {
    let (status, body) = send_as(
        app,
        user,
        "POST",
        "/api/habits",
        Some(serde_json::json!({ "title": title })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().parse().unwrap()
}
