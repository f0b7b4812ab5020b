use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::error::AppError;
use crate::handlers;
use crate::AppState;

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

/// `TimeoutLayer` answers with a bare 408; give it the error envelope.
async fn timeout_envelope(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        return AppError::Timeout.into_response();
    }
    response
}

fn with_request_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(timeout_envelope))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    // Credential endpoints, rate limited per client and path.
    let auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh-token", post(handlers::auth::refresh_token))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/readyz", get(handlers::health::readyz))
        .merge(auth_routes);

    let protected_routes = Router::new()
        // Account
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route(
            "/api/auth/me",
            get(handlers::auth::me)
                .put(handlers::auth::update_me)
                .delete(handlers::auth::delete_me),
        )
        .route("/api/auth/settings", put(handlers::auth::update_settings))
        // Habits
        .route(
            "/api/habits",
            get(handlers::habits::list_habits).post(handlers::habits::create_habit),
        )
        .route(
            "/api/habits/stats/overview",
            get(handlers::stats::stats_overview),
        )
        .route(
            "/api/habits/completions/date/:date",
            get(handlers::completions::completions_by_date),
        )
        .route(
            "/api/habits/:id",
            get(handlers::habits::get_habit)
                .put(handlers::habits::update_habit)
                .delete(handlers::habits::delete_habit),
        )
        // Completions
        .route(
            "/api/habits/:id/complete",
            post(handlers::completions::complete_habit),
        )
        .route(
            "/api/habits/:id/uncomplete",
            post(handlers::completions::uncomplete_habit),
        )
        .route(
            "/api/habits/:id/history",
            get(handlers::completions::habit_history),
        )
        // Moods
        .route(
            "/api/moods",
            get(handlers::moods::list_moods).post(handlers::moods::upsert_mood),
        )
        .route("/api/moods/stats", get(handlers::moods::mood_stats))
        .route("/api/moods/date/:date", get(handlers::moods::mood_by_date))
        .route(
            "/api/moods/:id",
            put(handlers::moods::update_mood).delete(handlers::moods::delete_mood),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = cors_layer(&state);
    let router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(route_not_found);

    with_request_timeout(router, state.config.request_timeout())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::{create_access_token, create_refresh_token};
    use crate::auth::rate_limit::RateLimitState;
    use crate::config::Config;
    use crate::db::pool::lazy_pool;

    fn test_app_with(config: Config) -> Router {
        let state = AppState {
            db: lazy_pool(&config),
            rate_limiter: RateLimitState::new(
                config.rate_limit_max_requests,
                config.rate_limit_window_secs,
            ),
            config: Arc::new(config),
        };
        build_router(state)
    }

    fn test_app() -> Router {
        test_app_with(Config::for_tests())
    }

    fn bearer() -> String {
        let token = create_access_token(Uuid::new_v4(), "an@example.com", &Config::for_tests())
            .unwrap();
        format!("Bearer {token}")
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn authed(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer())
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "habitlog-api");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let req = Request::get("/api/habits").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not authorized, no valid token");
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let req = Request::get("/api/moods")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_access_api() {
        let refresh = create_refresh_token(Uuid::new_v4(), "", &Config::for_tests()).unwrap();
        let req = Request::get("/api/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_habit_id_is_bad_request() {
        let req = authed("GET", "/api/habits/not-a-uuid").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid resource id"));
    }

    #[tokio::test]
    async fn test_bad_start_date_is_bad_request() {
        let req = authed("GET", "/api/habits/stats/overview?startDate=yesterday-ish")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_inverted_range_is_bad_request() {
        let req = authed(
            "GET",
            "/api/habits/stats/overview?startDate=2024-02-01&endDate=2024-01-01",
        )
        .body(Body::empty())
        .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "startDate must not be after endDate");
    }

    #[tokio::test]
    async fn test_bad_date_path_is_bad_request() {
        let req = authed("GET", "/api/moods/date/31-31-2024").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid date: 31-31-2024");
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let req = authed("POST", "/api/habits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\":"))
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_empty_title_is_bad_request() {
        let req = authed("POST", "/api/habits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":""}"#))
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title must be 1-200 characters");
    }

    #[tokio::test]
    async fn test_malformed_completion_body_is_bad_request() {
        let uri = format!("/api/habits/{}/complete", Uuid::new_v4());
        let req = authed("POST", &uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"date":"not-a-date"}"#))
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid date"));
    }

    #[tokio::test]
    async fn test_unknown_mood_is_bad_request() {
        let req = authed("POST", "/api/moods")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"mood":"ecstatic"}"#))
            .unwrap();
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_without_cookie_is_unauthorized() {
        let req = Request::post("/api/auth/refresh-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_register_validation_runs_before_database() {
        let req = Request::post("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"name":"An","email":"an@example.com","password":"123"}"#,
            ))
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Password must be 6-128 characters");
    }

    #[tokio::test]
    async fn test_auth_routes_are_rate_limited() {
        let mut config = Config::for_tests();
        config.rate_limit_max_requests = 1;
        let app = test_app_with(config);

        let request = || {
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap()
        };

        let (first, _) = send(app.clone(), request()).await;
        assert_eq!(first, StatusCode::BAD_REQUEST);

        let (second, body) = send(app, request()).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Too many requests, please try again later");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let req = Request::get("/api/nothing-here").body(Body::empty()).unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_frontend() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/api/habits")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[tokio::test]
    async fn test_timeout_uses_error_envelope() {
        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }

        let app = with_request_timeout(
            Router::new().route("/slow", get(slow)),
            Duration::from_millis(20),
        );
        let req = Request::get("/slow").body(Body::empty()).unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Request timed out");
    }

    #[tokio::test]
    async fn test_overview_range_is_capped() {
        let req = authed(
            "GET",
            "/api/habits/stats/overview?startDate=0001-01-01&endDate=9999-12-31",
        )
        .body(Body::empty())
        .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Date range must not exceed 366 days");
    }

    #[tokio::test]
    async fn test_open_ended_overview_start_is_capped() {
        let req = authed("GET", "/api/habits/stats/overview?startDate=2000-01-01")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_and_mood_stats_ranges_are_capped() {
        let history = format!(
            "/api/habits/{}/history?startDate=2020-01-01&endDate=2024-01-01",
            Uuid::new_v4()
        );
        for uri in [
            history.as_str(),
            "/api/moods/stats?startDate=2020-01-01&endDate=2024-01-01",
        ] {
            let req = authed("GET", uri).body(Body::empty()).unwrap();
            let (status, body) = send(test_app(), req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "Date range must not exceed 366 days");
        }
    }

    #[tokio::test]
    async fn test_blank_title_is_bad_request() {
        let req = authed("POST", "/api/habits")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title":"   "}"#))
            .unwrap();
        let (status, body) = send(test_app(), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title must be 1-200 characters");
    }
}
