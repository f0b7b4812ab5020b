use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness only; never touches the database.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "habitlog-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ready once the database answers a trivial query.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let ping = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await;
    let pool = json!({ "size": state.db.size(), "idle": state.db.num_idle() });

    match ping {
        Ok(_) => (StatusCode::OK, Json(json!({ "ready": true, "pool": pool }))),
        Err(e) => {
            tracing::warn!(error = %e, "Database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ready": false, "pool": pool, "error": "database unavailable" })),
            )
        }
    }
}
