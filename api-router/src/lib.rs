use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use middleware_api_auth::api_auth;
use routes::{
    ask::ask_question,
    bulk::{bulk_extract_text, bulk_output, bulk_status},
    extract::extract_text,
    health::{live, ready},
};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    // Public, unauthenticated endpoints (for k8s/systemd probes)
    let public = Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live));

    let body_limit = app_state.config.ingest_max_body_bytes;

    // Protected API endpoints (require auth when an API key is configured)
    let protected = Router::new()
        .route("/extract_text", post(extract_text).layer(DefaultBodyLimit::max(body_limit)))
        .route(
            "/bulk_extract_text",
            post(bulk_extract_text).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/bulk_output/{task_id}", get(bulk_output))
        .route("/bulk_status/{task_id}", get(bulk_status))
        .route("/ask", post(ask_question))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
