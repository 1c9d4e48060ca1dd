use axum::{extract::State, response::IntoResponse, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::{storage::types::upload::Upload, utils::ingest_limits::validate_upload_size};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct ExtractParams {
    #[form_data(limit = "unlimited")]
    pub image: FieldData<Bytes>,
}

pub async fn extract_text(
    State(state): State<ApiState>,
    TypedMultipart(input): TypedMultipart<ExtractParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = input
        .image
        .metadata
        .file_name
        .unwrap_or_else(|| "image".to_string());
    let upload = Upload::new(file_name, input.image.contents);
    validate_upload_size(&state.config, &upload.file_name, upload.len())?;

    info!(file_name = %upload.file_name, bytes = upload.len(), "Received single image");

    let extracted = state.gateway.ingest_single(upload).await?;

    Ok(Json(extracted))
}
