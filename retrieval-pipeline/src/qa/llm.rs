use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{QaAnswer, QaBackend};

const SYSTEM_PROMPT: &str = r#"You are an extractive question answering model.
Answer the question using only the provided context.
The answer MUST be copied verbatim from the context: a contiguous span, with no rewording.
Keep the span as short as possible while still answering the question.
Report your confidence that the span answers the question as a number between 0 and 1.
If the context does not contain an answer, return an empty answer with confidence 0."#;

#[derive(Debug, Deserialize)]
struct ExtractiveResponse {
    answer: String,
    confidence: f32,
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": { "type": "string" },
            "confidence": { "type": "number" }
        },
        "required": ["answer", "confidence"],
        "additionalProperties": false
    })
}

fn create_user_message(question: &str, context: &str) -> String {
    format!(
        r"
        Context:
        ==================
        {context}

        Question:
        ==================
        {question}
        "
    )
}

/// Extractive QA through a chat model constrained to a JSON schema.
pub struct LlmQaBackend {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl LlmQaBackend {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn create_chat_request(
        &self,
        question: &str,
        context: &str,
    ) -> Result<CreateChatCompletionRequest, OpenAIError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Extractive question answering".into()),
                name: "extractive_answer".into(),
                schema: Some(response_schema()),
                strict: Some(true),
            },
        };

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(SYSTEM_PROMPT.to_string()).into(),
                ChatCompletionRequestUserMessage::from(create_user_message(question, context))
                    .into(),
            ])
            .response_format(response_format)
            .build()
    }
}

fn process_llm_response(response: &CreateChatCompletionResponse) -> Result<ExtractiveResponse, AppError> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or(AppError::LLMParsing(
            "No content found in LLM response".into(),
        ))
        .and_then(|content| {
            serde_json::from_str::<ExtractiveResponse>(content).map_err(|e| {
                AppError::LLMParsing(format!("Failed to parse LLM response into answer: {e}"))
            })
        })
}

/// Finds `candidate` in `context` and returns the span as it appears there.
///
/// Matching falls back to ASCII case-insensitive search. `None` when the
/// candidate is not a span of the context.
pub fn locate_span<'a>(context: &'a str, candidate: &str) -> Option<&'a str> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    if let Some(start) = context.find(candidate) {
        return context.get(start..start.checked_add(candidate.len())?);
    }

    let haystack = context.to_ascii_lowercase();
    let needle = candidate.to_ascii_lowercase();
    let start = haystack.find(&needle)?;
    context.get(start..start.checked_add(needle.len())?)
}

#[async_trait]
impl QaBackend for LlmQaBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn answer(&self, question: &str, context: &str) -> Result<QaAnswer, AppError> {
        let request = self.create_chat_request(question, context)?;
        let response = self.client.chat().create(request).await?;
        let parsed = process_llm_response(&response)?;

        match locate_span(context, &parsed.answer) {
            Some(span) => Ok(QaAnswer::new(span, parsed.confidence)),
            None => {
                debug!(answer = %parsed.answer, "Model answer is not a span of the context");
                Ok(QaAnswer::none())
            }
        }
    }
}
