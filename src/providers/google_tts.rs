//! Google Cloud Text-to-Speech over its REST endpoint.
//!
//! `POST https://texttospeech.googleapis.com/v1/text:synthesize`, authorised
//! either with an API key (`?key=`) or an OAuth bearer token. LINEAR16
//! responses already carry a RIFF/WAV header, so the bytes are written as-is.

use super::{check_status, http_client, request_error, SpeechProvider};
use crate::config::{AudioFormat, VoiceConfig};
use crate::error::{Pdf2VideoError, ProviderError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ENDPOINT: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// How requests are authorised.
#[derive(Clone)]
pub enum GoogleAuth {
    ApiKey(String),
    Bearer(String),
}

pub struct GoogleTtsProvider {
    client: reqwest::Client,
    auth: GoogleAuth,
    endpoint: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: TextInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssml_gender: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

impl GoogleTtsProvider {
    pub fn new(auth: GoogleAuth, timeout: Duration) -> Result<Self, Pdf2VideoError> {
        Ok(Self {
            client: http_client(timeout)?,
            auth,
            endpoint: ENDPOINT.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Point at a different endpoint (regional or test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Voice selection per voice family: Chirp3-HD voices take a name only;
/// other named voices take the name; an empty name selects by gender.
fn voice_selection(voice: &VoiceConfig) -> VoiceSelection<'_> {
    let name = Some(voice.voice_name.trim()).filter(|n| !n.is_empty());
    let ssml_gender = if voice.is_chirp_hd() || name.is_some() {
        None
    } else {
        Some(voice.voice_gender.ssml_name())
    };
    VoiceSelection {
        language_code: &voice.language_code,
        name,
        ssml_gender,
    }
}

fn audio_encoding(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Wav => "LINEAR16",
        AudioFormat::Mp3 => "MP3",
    }
}

#[async_trait]
impl SpeechProvider for GoogleTtsProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, ProviderError> {
        let body = SynthesizeRequest {
            input: TextInput { text },
            voice: voice_selection(voice),
            audio_config: AudioConfig {
                audio_encoding: audio_encoding(voice.audio_format),
                speaking_rate: voice.speaking_rate,
            },
        };

        let request = match &self.auth {
            GoogleAuth::ApiKey(key) => self.client.post(&self.endpoint).query(&[("key", key)]),
            GoogleAuth::Bearer(token) => self.client.post(&self.endpoint).bearer_auth(token),
        };

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error("google", e, self.timeout_secs))?;
        let response = check_status("google", response).await?;

        let parsed: SynthesizeResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: "google".into(),
                    detail: e.to_string(),
                })?;

        let audio = STANDARD
            .decode(parsed.audio_content.as_bytes())
            .map_err(|e| ProviderError::InvalidResponse {
                provider: "google".into(),
                detail: format!("audioContent is not base64: {e}"),
            })?;
        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse {
                provider: "google".into(),
                detail: "empty audioContent".into(),
            });
        }
        debug!("google: {} bytes of audio", audio.len());
        Ok(audio)
    }
}
