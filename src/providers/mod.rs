//! Capability traits for the external services the pipeline drives.
//!
//! * [`NarrationProvider`] — a vision LLM that describes a slide image and
//!   completes text prompts (used by narration and polishing).
//! * [`SpeechProvider`] — a TTS engine turning text into audio bytes.
//!
//! Concrete variants are chosen once from [`PipelineConfig`] by
//! [`create_narration_provider`] and [`create_speech_provider`], then shared
//! as `Arc<dyn …>` across concurrent workers. Tests inject their own
//! implementations through [`crate::orchestrator::PipelineBuilder`].

pub mod google_tts;
pub mod llm;
pub mod openai_tts;

use crate::config::{PipelineConfig, TtsProviderKind, VoiceConfig};
use crate::error::{Pdf2VideoError, ProviderError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub use google_tts::GoogleTtsProvider;
pub use llm::LlmNarrationProvider;
pub use openai_tts::OpenAiTtsProvider;

/// Text returned by an LLM call, with token usage for the stage report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// A vision-capable language model.
#[async_trait]
pub trait NarrationProvider: Send + Sync {
    /// Short identifier used in logs and error messages.
    fn name(&self) -> &str;

    /// Describe a PNG slide image following `prompt`.
    async fn describe_image(&self, png: &[u8], prompt: &str) -> Result<Completion, ProviderError>;

    /// Text-only completion.
    async fn complete_text(&self, prompt: &str) -> Result<Completion, ProviderError>;
}

/// A text-to-speech engine.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Synthesise `text` and return the encoded audio in
    /// `voice.audio_format`.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, ProviderError>;
}

/// Build the narration provider selected by `config`.
///
/// A pre-built client in `config.llm` is used as-is. Otherwise the client is
/// built from the configured API key, falling back to the provider's
/// environment variable.
pub fn create_narration_provider(
    config: &PipelineConfig,
) -> Result<Arc<dyn NarrationProvider>, Pdf2VideoError> {
    let llm = match config.llm {
        Some(ref llm) => Arc::clone(llm),
        None => {
            let provider = config.provider;
            let key = config.credentials.llm_key(provider).ok_or_else(|| {
                Pdf2VideoError::ConfigInvalid(format!(
                    "no API key for LLM provider '{provider}': set {} or add it to the config file",
                    provider.api_key_var()
                ))
            })?;
            llm::build_llm(provider, key, config.model())
        }
    };
    info!(
        "Narration provider: {} / {}",
        config.provider,
        config.model()
    );
    Ok(Arc::new(LlmNarrationProvider::new(
        llm,
        config.provider.as_str(),
        config.temperature,
        config.max_tokens,
        config.api_timeout(),
    )))
}

/// Build the TTS provider selected by `config`.
pub fn create_speech_provider(
    config: &PipelineConfig,
) -> Result<Arc<dyn SpeechProvider>, Pdf2VideoError> {
    info!("Speech provider: {}", config.tts_provider);
    match config.tts_provider {
        TtsProviderKind::Google => {
            let auth = match (
                config.credentials.google_tts_api_key(),
                config.credentials.google_tts_access_token(),
            ) {
                (Some(key), _) => google_tts::GoogleAuth::ApiKey(key),
                (None, Some(token)) => google_tts::GoogleAuth::Bearer(token),
                (None, None) => {
                    return Err(Pdf2VideoError::ConfigInvalid(
                        "Google TTS needs GOOGLE_TTS_API_KEY or GOOGLE_TTS_ACCESS_TOKEN".into(),
                    ))
                }
            };
            Ok(Arc::new(GoogleTtsProvider::new(auth, config.api_timeout())?))
        }
        TtsProviderKind::OpenAi => {
            let key = config
                .credentials
                .llm_key(crate::config::ProviderKind::OpenAi)
                .ok_or_else(|| {
                    Pdf2VideoError::ConfigInvalid(
                        "OpenAI TTS needs OPENAI_API_KEY".into(),
                    )
                })?;
            Ok(Arc::new(OpenAiTtsProvider::new(
                key,
                config.tts_model.clone(),
                config.api_timeout(),
            )?))
        }
    }
}

/// Shared HTTP client for the TTS providers.
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, Pdf2VideoError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Pdf2VideoError::Internal(format!("HTTP client: {e}")))
}

/// Map a reqwest failure onto [`ProviderError`].
pub(crate) fn request_error(provider: &str, e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout { secs: timeout_secs }
    } else {
        ProviderError::Api {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

/// Turn a non-2xx response into [`ProviderError::Api`] with the body text.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ProviderError::Api {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {}", truncate(&body, 500)),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
