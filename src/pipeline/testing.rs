//! Scripted `LLMProvider` for adapter tests.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LLMResponse, LlmError};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Replays queued answers and records the options of every call.
#[derive(Default)]
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<String, String>>>,
    seen: Mutex<Vec<Option<CompletionOptions>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn answering<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| Ok(a.into())).collect()),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answers: Mutex::new(VecDeque::from([Err(message.to_string())])),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Options passed to each `chat` call so far.
    pub fn seen_options(&self) -> Vec<Option<CompletionOptions>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn max_context_length(&self) -> usize {
        4096
    }

    async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
        self.chat(&[], None).await
    }

    async fn complete_with_options(
        &self,
        _prompt: &str,
        options: &CompletionOptions,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.chat(&[], Some(options)).await
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        options: Option<&CompletionOptions>,
    ) -> edgequake_llm::Result<LLMResponse> {
        self.seen.lock().unwrap().push(options.cloned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(Ok(content)) => Ok(LLMResponse::new(content, "scripted-model")),
            Some(Err(message)) => Err(LlmError::ApiError(message)),
            None => Err(LlmError::ApiError("no scripted answer left".into())),
        }
    }
}
