//! The classifier adapter: does this page image contain a magnifier glyph?
//!
//! A single discriminated result comes back: `Ok(Classification { found })`
//! or `Err(ClassificationError)`. Model answers are normalised through
//! [`parse_verdict`], which accepts exactly `yes` or `no`; anything else is
//! logged and reported as `found: false`.

use crate::error::ClassificationError;
use crate::pipeline::encode::encode_image;
use crate::pipeline::postprocess::normalise_answer;
use crate::prompts::CLASSIFIER_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of a successful classifier call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub found: bool,
}

/// How a raw model answer was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    /// Anything that is not exactly `yes` or `no` after normalisation.
    NonConforming(String),
}

impl Verdict {
    pub fn found(&self) -> bool {
        matches!(self, Verdict::Yes)
    }
}

/// Strictly interpret a yes/no answer.
pub fn parse_verdict(raw: &str) -> Verdict {
    match normalise_answer(raw).as_str() {
        "yes" => Verdict::Yes,
        "no" => Verdict::No,
        other => Verdict::NonConforming(other.to_string()),
    }
}

/// Decides whether a page image contains a marker.
#[async_trait]
pub trait MarkerClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> Result<Classification, ClassificationError>;
}

/// Classifier backed by a hosted vision model.
pub struct VisionClassifier {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    options: CompletionOptions,
    timeout: Option<Duration>,
}

impl VisionClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            prompt: CLASSIFIER_PROMPT.to_string(),
            options: CompletionOptions {
                temperature: Some(0.0),
                max_tokens: Some(8),
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
impl MarkerClassifier for VisionClassifier {
    async fn classify(&self, image: &[u8]) -> Result<Classification, ClassificationError> {
        let messages = vec![ChatMessage::user_with_images(
            self.prompt.as_str(),
            vec![encode_image(image)],
        )];

        let call = self.provider.chat(&messages, Some(&self.options));
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ClassificationError::Timeout {
                    secs: limit.as_secs(),
                })?,
            None => call.await,
        }
        .map_err(|e| ClassificationError::Provider(e.to_string()))?;

        let verdict = parse_verdict(&response.content);
        match &verdict {
            Verdict::NonConforming(answer) => {
                warn!("Classifier gave a non yes/no answer {:?}; treating as no marker", answer);
            }
            v => debug!("Classifier answered {:?}", v),
        }

        Ok(Classification {
            found: verdict.found(),
        })
    }
}
