use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Json,
};
use common::{
    storage::types::upload::Upload,
    utils::ingest_limits::{validate_bulk_input, validate_upload_size},
};
use tracing::{debug, info};

use crate::{api_state::ApiState, error::ApiError};

/// Accepts any number of file fields under any names. Fields without a file name
/// are ignored.
pub async fn bulk_extract_text(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(ToString::to_string) else {
            debug!(field = ?field.name(), "Skipping non-file multipart field");
            continue;
        };
        let data = field.bytes().await?;
        validate_upload_size(&state.config, &file_name, data.len())?;
        uploads.push(Upload::new(file_name, data));

        if uploads.len() > state.config.ingest_max_files {
            break;
        }
    }

    validate_bulk_input(&state.config, uploads.len())?;
    info!(file_count = uploads.len(), "Received bulk extraction request");

    let receipt = state.bulk.start_bulk(uploads).await?;

    Ok(Json(receipt))
}

pub async fn bulk_output(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bulk.get_outputs(&task_id).await?))
}

pub async fn bulk_status(
    State(state): State<ApiState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.bulk.job_status(&task_id).await?))
}
