//! Vision LLM calls through `edgequake-llm`.
//!
//! One thin adapter serves both Gemini and OpenAI: the vendor protocol lives
//! in `edgequake-llm`, and all prompt text lives in [`crate::prompts`]. This
//! module only builds messages, applies the per-call timeout, and reports
//! token usage.
//!
//! There is no retry loop. A failed call surfaces as a per-slide error and a
//! re-run of the same step retries only the slides that failed.

use super::{Completion, NarrationProvider};
use crate::error::ProviderError;
use crate::pipeline::encode::encode_slide;
use async_trait::async_trait;
use crate::config::ProviderKind;
use edgequake_llm::{ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, OpenAIProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Vendor client for `provider` authenticated with `api_key`.
pub fn build_llm(provider: ProviderKind, api_key: String, model: &str) -> Arc<dyn LLMProvider> {
    match provider {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(api_key).with_model(model)),
        ProviderKind::OpenAi => Arc::new(OpenAIProvider::new(api_key).with_model(model)),
    }
}

/// [`NarrationProvider`] backed by any `edgequake_llm::LLMProvider`.
pub struct LlmNarrationProvider {
    llm: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmNarrationProvider {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            name: name.into(),
            temperature,
            max_tokens,
            timeout,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<Completion, ProviderError> {
        let options = self.options();
        let response = tokio::time::timeout(self.timeout, self.llm.chat(&messages, Some(&options)))
            .await
            .map_err(|_| ProviderError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ProviderError::Api {
                provider: self.name.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );

        Ok(Completion {
            text: response.content,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}

#[async_trait]
impl NarrationProvider for LlmNarrationProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn describe_image(&self, png: &[u8], prompt: &str) -> Result<Completion, ProviderError> {
        let image = encode_slide(png);
        self.chat(vec![ChatMessage::user_with_images(prompt, vec![image])])
            .await
    }

    async fn complete_text(&self, prompt: &str) -> Result<Completion, ProviderError> {
        self.chat(vec![ChatMessage::user(prompt)]).await
    }
}
