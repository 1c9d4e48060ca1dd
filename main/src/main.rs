use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::utils::config::get_config;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;
    info!(
        data_dir = %config.data_path().display(),
        corpus_backend = ?config.corpus_backend,
        ocr_backend = ?config.ocr_backend,
        qa_backend = ?config.qa_backend,
        "Configuration loaded"
    );

    let api_state = ApiState::new(&config).await?;
    let app = build_app(&api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_app(api_state: &ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes_v1(api_state))
        .layer(TraceLayer::new_for_http())
        .with_state(api_state.clone())
}
