use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

pub async fn ask_question(
    State(state): State<ApiState>,
    Json(request): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let answer = state.qa.ask(&request.question).await?;

    Ok(Json(answer))
}
