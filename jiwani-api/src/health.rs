use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /api/health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.uow.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "database": "up" }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "degraded", "database": "down" })))
        }
    }
}
