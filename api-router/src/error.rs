use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{error::AppError, utils::ingest_limits::IngestValidationError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Upstream failure: {0}")]
    BadGateway(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::EmptyCorpus => Self::ValidationError(err.to_string()),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::JobNotFound(id) => Self::NotFound(format!("No job with id {id}")),
            AppError::Extraction(msg) => Self::Unprocessable(msg),
            AppError::QaFailure(msg) => {
                tracing::warn!(error = %msg, "Question answering failed");
                Self::BadGateway(msg)
            }
            AppError::JobCreation(_) | AppError::Io(_) | AppError::OpenAI(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
            _ => Self::InternalError("Internal server error".to_string()),
        }
    }
}

impl From<IngestValidationError> for ApiError {
    fn from(err: IngestValidationError) -> Self {
        match err {
            IngestValidationError::PayloadTooLarge(msg) => Self::PayloadTooLarge(msg),
            IngestValidationError::BadRequest(msg) => Self::ValidationError(msg),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::ValidationError(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            Self::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message),
            Self::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            Self::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                status: "error".to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}
