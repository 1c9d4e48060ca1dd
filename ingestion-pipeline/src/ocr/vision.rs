use std::{path::Path, sync::Arc};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{error::AppError, storage::types::upload::guess_mime_type};

use super::OcrBackend;

const TRANSCRIBE_PROMPT: &str = r#"Transcribe all text visible in this image verbatim, preserving line breaks.
Do not describe the image, add commentary, or translate anything.
If the image contains no legible text, respond with an empty message."#;

/// OCR through a vision capable chat model.
pub struct VisionModelBackend {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl VisionModelBackend {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl OcrBackend for VisionModelBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn run_ocr(&self, image_path: &Path) -> Result<String, AppError> {
        let image_bytes = tokio::fs::read(image_path).await?;
        let image_url = format!(
            "data:{};base64,{}",
            guess_mime_type(image_path),
            STANDARD.encode(&image_bytes)
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(6400_u32)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(TRANSCRIBE_PROMPT)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(image_url)
                                .detail(ImageDetail::High)
                                .build()?,
                        )
                        .build()?
                        .into(),
                ])
                .build()?
                .into()])
            .build()?;

        let response = self.client.chat().create(request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|text| text.trim().to_string())
            .unwrap_or_default())
    }
}
