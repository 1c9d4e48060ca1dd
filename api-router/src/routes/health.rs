use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if the corpus can be read, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.corpus.read_all().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "corpus": "ok" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "corpus": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}

/// Liveness probe: 200 whenever the process can serve requests.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
