mod lexical;
mod llm;

pub use lexical::LexicalQaBackend;
pub use llm::{locate_span, LlmQaBackend};

use std::{sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::AppError,
    utils::config::{AppConfig, QaBackendKind},
};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// An extractive answer: a span of the context plus how sure the backend is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub confidence: f32,
}

impl QaAnswer {
    pub fn new(answer: impl Into<String>, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn none() -> Self {
        Self::new(String::new(), 0.0)
    }
}

#[async_trait]
pub trait QaBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, AppError>;
}

/// Bounds each QA call with a timeout and reports every failure as `QaFailure`.
pub struct QaAdapter {
    backend: Arc<dyn QaBackend>,
    timeout: Duration,
}

impl QaAdapter {
    pub fn new(backend: Arc<dyn QaBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn from_config(
        config: &AppConfig,
        openai_client: Option<Arc<Client<OpenAIConfig>>>,
    ) -> Result<Self, AppError> {
        let backend: Arc<dyn QaBackend> = match config.qa_backend {
            QaBackendKind::Lexical => Arc::new(LexicalQaBackend::new()),
            QaBackendKind::OpenAI => {
                let client = openai_client.ok_or_else(|| {
                    AppError::InternalError(
                        "OpenAI QA backend selected but no client was configured".into(),
                    )
                })?;
                Arc::new(LlmQaBackend::new(client, config.qa_model.clone()))
            }
        };
        info!(backend = backend.name(), "QA backend initialized");

        Ok(Self::new(backend, Duration::from_secs(config.qa_timeout_secs)))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[instrument(skip_all, fields(backend = self.backend.name(), context_chars = context.len()))]
    pub async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, AppError> {
        match tokio::time::timeout(self.timeout, self.backend.answer(question, context)).await {
            Ok(Ok(answer)) => {
                debug!(confidence = answer.confidence, "QA call finished");
                Ok(answer)
            }
            Ok(Err(AppError::QaFailure(reason))) => Err(AppError::QaFailure(reason)),
            Ok(Err(err)) => Err(AppError::QaFailure(err.to_string())),
            Err(_) => Err(AppError::QaFailure(format!(
                "QA timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}
