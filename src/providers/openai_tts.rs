//! OpenAI speech endpoint (`POST /v1/audio/speech`).

use super::{check_status, http_client, request_error, SpeechProvider};
use crate::config::{AudioFormat, VoiceConfig};
use crate::error::{Pdf2VideoError, ProviderError};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Voices the speech endpoint accepts.
const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer", "verse",
];
const FALLBACK_VOICE: &str = "alloy";

pub struct OpenAiTtsProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    speed: f64,
}

impl OpenAiTtsProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Pdf2VideoError> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: ENDPOINT.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Map the configured voice name onto an OpenAI voice. Google-style names
/// such as `en-US-Neural2-D` fall back to `alloy`.
fn openai_voice(name: &str) -> &str {
    let wanted = name.trim();
    OPENAI_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(wanted))
        .copied()
        .unwrap_or_else(|| {
            warn!("Voice '{}' is not an OpenAI voice, using '{}'", name, FALLBACK_VOICE);
            FALLBACK_VOICE
        })
}

fn response_format(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Wav => "wav",
        AudioFormat::Mp3 => "mp3",
    }
}

#[async_trait]
impl SpeechProvider for OpenAiTtsProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, ProviderError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: openai_voice(&voice.voice_name),
            response_format: response_format(voice.audio_format),
            speed: voice.speaking_rate,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("openai", e, self.timeout_secs))?;
        let response = check_status("openai", response).await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: "openai".into(),
                detail: e.to_string(),
            })?;
        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: "openai".into(),
                detail: "empty audio body".into(),
            });
        }
        debug!("openai: {} bytes of audio", audio.len());
        Ok(audio.to_vec())
    }
}
