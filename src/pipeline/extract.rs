//! The extractor adapter: transcribe every magnifier item on a page.
//!
//! The call runs in the provider's JSON mode (`response_format =
//! "json_object"`) and the prompt names the [`MarkerPage`] shape. The answer
//! is stripped of code fences and deserialised; deserialisation *is* the schema
//! check, so a response with a missing `text_after_symbol`, a non-integer
//! `cycle_id` or a wrong top-level shape is rejected as a whole with
//! [`ExtractionError::Schema`].

use crate::error::ExtractionError;
use crate::output::MarkerPage;
use crate::pipeline::encode::encode_image;
use crate::pipeline::postprocess::json_payload;
use crate::prompts::EXTRACTOR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Structured-output mode requested from the provider.
pub const JSON_RESPONSE_FORMAT: &str = "json_object";

/// Parse and validate a raw extractor answer.
pub fn parse_marker_page(raw: &str) -> Result<MarkerPage, ExtractionError> {
    let payload = json_payload(raw);
    serde_json::from_str::<MarkerPage>(&payload).map_err(|e| {
        let preview: String = payload.chars().take(120).collect();
        ExtractionError::Schema(format!("{e} (response starts with {preview:?})"))
    })
}

/// Transcribes the marker items on a page image.
#[async_trait]
pub trait MarkerExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<MarkerPage, ExtractionError>;
}

/// Extractor backed by a hosted vision model.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
    timeout: Option<Duration>,
}

impl VisionExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            prompt: EXTRACTOR_PROMPT.to_string(),
            options: CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(1000),
                response_format: Some(JSON_RESPONSE_FORMAT.to_string()),
                ..Default::default()
            },
            timeout: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_options(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.options.temperature = Some(temperature);
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MarkerExtractor for VisionExtractor {
    async fn extract(&self, image: &[u8]) -> Result<MarkerPage, ExtractionError> {
        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![encode_image(image)],
        )];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ExtractionError::Timeout {
                    secs: limit.as_secs(),
                })?,
            None => call.await,
        }
        .map_err(|e| ExtractionError::Provider(e.to_string()))?;

        debug!(
            "Extractor: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        parse_marker_page(&response.content)
    }
}
