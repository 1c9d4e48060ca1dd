use async_openai::error::OpenAIError;
use thiserror::Error;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Extraction failure: {0}")]
    Extraction(String),
    #[error("Job creation failure: {0}")]
    JobCreation(String),
    #[error("Job not found: {0}")]
    JobNotFound(String),
    #[error("No text has been ingested yet")]
    EmptyCorpus,
    #[error("Question answering failure: {0}")]
    QaFailure(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}
