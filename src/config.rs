//! Configuration types for PDF-to-video conversion.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`] and validated once in `build()`. The config is
//! an explicit value injected into [`crate::orchestrator::Pipeline`]; nothing
//! reads global state after construction except credential lookup, which
//! falls back to the environment variables the LLM client library uses.
//!
//! A [`FileConfig`] is the TOML shape of the same settings. All of its fields
//! are optional; [`PipelineConfigBuilder::apply_file`] layers it over the
//! defaults so the CLI can then layer flags and environment variables on top.

use crate::error::Pdf2VideoError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Valid speaking-rate range accepted by every TTS backend we drive.
pub const SPEAKING_RATE_RANGE: std::ops::RangeInclusive<f64> = 0.25..=4.0;

/// Configuration for a PDF-to-video run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2video::{PipelineConfig, ProviderKind};
///
/// let config = PipelineConfig::builder()
///     .provider(ProviderKind::OpenAi)
///     .dpi(150)
///     .concurrency(4)
///     .speaking_rate(1.1)
///     .build()
///     .unwrap();
/// assert_eq!(config.model(), "gpt-4o-mini");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Vision LLM vendor used for narration and polishing. Default: Gemini.
    pub provider: ProviderKind,

    /// LLM model identifier. If None, uses [`ProviderKind::default_model`].
    pub model: Option<String>,

    /// Pre-constructed LLM client. Takes precedence over `provider`/`model`
    /// and skips the credential check.
    pub llm: Option<Arc<dyn LLMProvider>>,

    /// API keys and tokens. Unset values fall back to the environment.
    pub credentials: Credentials,

    /// Text-to-speech backend. Default: Google Cloud TTS.
    pub tts_provider: TtsProviderKind,

    /// Model name for the OpenAI speech endpoint. Default: "tts-1".
    pub tts_model: String,

    /// Voice selection and audio container.
    pub voice: VoiceConfig,

    /// Rendering DPI for each PDF page. Range: 72–600. Default: 200.
    ///
    /// Slides are mostly large type and diagrams; 200 DPI keeps text crisp
    /// for the vision model and for a 1080p canvas without inflating uploads.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 4000.
    ///
    /// Applied after DPI scaling, preserving aspect ratio, so an oversized
    /// poster page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Encoder settings for the final video.
    pub video: VideoSettings,

    /// Longest subtitle cue in characters before it is split. Default: 200.
    pub max_chars_per_cue: usize,

    /// Narration prompt template. If None, uses
    /// [`crate::prompts::DEFAULT_NARRATION_PROMPT`].
    pub narration_prompt: Option<String>,

    /// Polishing prompt template. If None, uses
    /// [`crate::prompts::DEFAULT_POLISH_PROMPT`]. Must contain
    /// `{current_content}`.
    pub polish_prompt: Option<String>,

    /// Include the polish step in an "all" run. Default: false.
    pub polish_enabled: bool,

    /// Maximum in-flight provider calls per stage. Default: 8.
    pub concurrency: usize,

    /// Per-call timeout for LLM and TTS requests in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Timeout for each ffmpeg/ffprobe invocation in seconds. Default: 600.
    pub mux_timeout_secs: u64,

    /// Sampling temperature for LLM completions. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 6000.
    pub max_tokens: usize,

    /// Explicit pdfium shared library. If None, the system library is used.
    pub pdfium_lib_path: Option<PathBuf>,

    /// ffmpeg executable. Default: "ffmpeg" on PATH.
    pub ffmpeg_path: PathBuf,

    /// ffprobe executable. Default: "ffprobe" on PATH.
    pub ffprobe_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            llm: None,
            credentials: Credentials::default(),
            tts_provider: TtsProviderKind::default(),
            tts_model: "tts-1".to_string(),
            voice: VoiceConfig::default(),
            dpi: 200,
            max_rendered_pixels: 4000,
            video: VideoSettings::default(),
            max_chars_per_cue: 200,
            narration_prompt: None,
            polish_prompt: None,
            polish_enabled: false,
            concurrency: 8,
            api_timeout_secs: 120,
            mux_timeout_secs: 600,
            temperature: 0.3,
            max_tokens: 6000,
            pdfium_lib_path: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("llm", &self.llm.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("credentials", &self.credentials)
            .field("tts_provider", &self.tts_provider)
            .field("tts_model", &self.tts_model)
            .field("voice", &self.voice)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("video", &self.video)
            .field("max_chars_per_cue", &self.max_chars_per_cue)
            .field("polish_enabled", &self.polish_enabled)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("mux_timeout_secs", &self.mux_timeout_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder seeded with the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured model, or the provider's default.
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_secs(self.mux_timeout_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Use a pre-built LLM client instead of the provider factory.
    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.config.llm = Some(llm);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    pub fn tts_provider(mut self, provider: TtsProviderKind) -> Self {
        self.config.tts_provider = provider;
        self
    }

    pub fn tts_model(mut self, model: impl Into<String>) -> Self {
        self.config.tts_model = model.into();
        self
    }

    pub fn voice(mut self, voice: VoiceConfig) -> Self {
        self.config.voice = voice;
        self
    }

    pub fn language_code(mut self, code: impl Into<String>) -> Self {
        self.config.voice.language_code = code.into();
        self
    }

    pub fn voice_name(mut self, name: impl Into<String>) -> Self {
        self.config.voice.voice_name = name.into();
        self
    }

    pub fn voice_gender(mut self, gender: VoiceGender) -> Self {
        self.config.voice.voice_gender = gender;
        self
    }

    /// Not clamped: out-of-range rates are rejected by `build()`.
    pub fn speaking_rate(mut self, rate: f64) -> Self {
        self.config.voice.speaking_rate = rate;
        self
    }

    pub fn audio_format(mut self, format: AudioFormat) -> Self {
        self.config.voice.audio_format = format;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn video(mut self, video: VideoSettings) -> Self {
        self.config.video = video;
        self
    }

    pub fn video_quality(mut self, crf: u8) -> Self {
        self.config.video.quality = crf;
        self
    }

    pub fn video_preset(mut self, preset: impl Into<String>) -> Self {
        self.config.video.preset = preset.into();
        self
    }

    pub fn resolution_scale(mut self, scale: f64) -> Self {
        self.config.video.resolution_scale = scale;
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.video.fps = fps;
        self
    }

    pub fn embed_subtitles(mut self, v: bool) -> Self {
        self.config.video.embed_subtitles = v;
        self
    }

    pub fn max_chars_per_cue(mut self, n: usize) -> Self {
        self.config.max_chars_per_cue = n;
        self
    }

    pub fn narration_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.narration_prompt = Some(prompt.into());
        self
    }

    pub fn polish_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.polish_prompt = Some(prompt.into());
        self
    }

    pub fn polish_enabled(mut self, v: bool) -> Self {
        self.config.polish_enabled = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn mux_timeout_secs(mut self, secs: u64) -> Self {
        self.config.mux_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffprobe_path = path.into();
        self
    }

    /// Layer every value present in `file` over the current settings.
    pub fn apply_file(mut self, file: &FileConfig) -> Result<Self, Pdf2VideoError> {
        let c = &mut self.config;
        if let Some(ref v) = file.provider {
            c.provider = v.parse()?;
        }
        if let Some(ref v) = file.model {
            c.model = Some(v.clone());
        }
        if let Some(ref v) = file.gemini_api_key {
            c.credentials.gemini_api_key = Some(v.clone());
        }
        if let Some(ref v) = file.openai_api_key {
            c.credentials.openai_api_key = Some(v.clone());
        }
        if let Some(ref v) = file.google_tts_api_key {
            c.credentials.google_tts_api_key = Some(v.clone());
        }
        if let Some(ref v) = file.google_tts_access_token {
            c.credentials.google_tts_access_token = Some(v.clone());
        }
        if let Some(ref v) = file.tts_provider {
            c.tts_provider = v.parse()?;
        }
        if let Some(ref v) = file.tts_model {
            c.tts_model = v.clone();
        }
        if let Some(ref v) = file.language_code {
            c.voice.language_code = v.clone();
        }
        if let Some(ref v) = file.voice_name {
            c.voice.voice_name = v.clone();
        }
        if let Some(ref v) = file.voice_gender {
            c.voice.voice_gender = v.parse()?;
        }
        if let Some(v) = file.speaking_rate {
            c.voice.speaking_rate = v;
        }
        if let Some(ref v) = file.audio_format {
            c.voice.audio_format = v.parse()?;
        }
        if let Some(v) = file.dpi {
            c.dpi = v;
        }
        if let Some(v) = file.max_rendered_pixels {
            c.max_rendered_pixels = v.max(100);
        }
        if let Some(v) = file.video_quality {
            c.video.quality = v;
        }
        if let Some(ref v) = file.video_preset {
            c.video.preset = v.clone();
        }
        if let Some(v) = file.resolution_scale {
            c.video.resolution_scale = v;
        }
        if let Some(v) = file.fps {
            c.video.fps = v;
        }
        if let Some(v) = file.embed_subtitles {
            c.video.embed_subtitles = v;
        }
        if let Some(v) = file.max_chars_per_cue {
            c.max_chars_per_cue = v;
        }
        if let Some(ref v) = file.narration_prompt {
            c.narration_prompt = Some(v.clone());
        }
        if let Some(ref v) = file.polish_prompt {
            c.polish_prompt = Some(v.clone());
        }
        if let Some(v) = file.polish_enabled {
            c.polish_enabled = v;
        }
        if let Some(v) = file.concurrency {
            c.concurrency = v.max(1);
        }
        if let Some(v) = file.api_timeout_secs {
            c.api_timeout_secs = v;
        }
        if let Some(v) = file.mux_timeout_secs {
            c.mux_timeout_secs = v;
        }
        if let Some(v) = file.temperature {
            c.temperature = v.clamp(0.0, 2.0);
        }
        if let Some(v) = file.max_tokens {
            c.max_tokens = v;
        }
        if let Some(ref v) = file.pdfium_lib_path {
            c.pdfium_lib_path = Some(v.clone());
        }
        if let Some(ref v) = file.ffmpeg_path {
            c.ffmpeg_path = v.clone();
        }
        if let Some(ref v) = file.ffprobe_path {
            c.ffprobe_path = v.clone();
        }
        Ok(self)
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Pdf2VideoError> {
        let c = &self.config;
        if !(72..=600).contains(&c.dpi) {
            return Err(Pdf2VideoError::ConfigInvalid(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2VideoError::ConfigInvalid(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_chars_per_cue == 0 {
            return Err(Pdf2VideoError::ConfigInvalid(
                "max_chars_per_cue must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 || c.mux_timeout_secs == 0 {
            return Err(Pdf2VideoError::ConfigInvalid(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref p) = c.polish_prompt {
            if !p.contains("{current_content}") {
                return Err(Pdf2VideoError::ConfigInvalid(
                    "polish_prompt must contain the {current_content} placeholder".into(),
                ));
            }
        }
        c.voice.validate()?;
        c.video.validate()?;
        Ok(self.config)
    }
}

// ── Providers ────────────────────────────────────────────────────────────

/// Vision LLM vendor for narration and polishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl ProviderKind {
    /// Lower-case name used in flags, config files and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::OpenAi => "gpt-4o-mini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(Pdf2VideoError::ConfigInvalid(format!(
                "unsupported LLM provider '{other}' (expected gemini or openai)"
            ))),
        }
    }
}

/// Text-to-speech backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    #[default]
    Google,
    OpenAi,
}

impl fmt::Display for TtsProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TtsProviderKind::Google => "google",
            TtsProviderKind::OpenAi => "openai",
        })
    }
}

impl FromStr for TtsProviderKind {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(TtsProviderKind::Google),
            "openai" => Ok(TtsProviderKind::OpenAi),
            other => Err(Pdf2VideoError::ConfigInvalid(format!(
                "unsupported TTS provider '{other}' (expected google or openai)"
            ))),
        }
    }
}

/// API keys and tokens.
///
/// A `None` field is looked up in the environment at provider construction
/// time, so a run that only rasterises never needs any of them.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_tts_api_key: Option<String>,
    pub google_tts_access_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("google_tts_api_key", &mask(&self.google_tts_api_key))
            .field("google_tts_access_token", &mask(&self.google_tts_access_token))
            .finish()
    }
}

impl Credentials {
    /// API key for an LLM provider: configured value, else its env var.
    pub fn llm_key(&self, provider: ProviderKind) -> Option<String> {
        let configured = match provider {
            ProviderKind::Gemini => self.gemini_api_key.clone(),
            ProviderKind::OpenAi => self.openai_api_key.clone(),
        };
        configured.or_else(|| env_non_empty(provider.api_key_var()))
    }

    pub fn google_tts_api_key(&self) -> Option<String> {
        self.google_tts_api_key
            .clone()
            .or_else(|| env_non_empty("GOOGLE_TTS_API_KEY"))
    }

    pub fn google_tts_access_token(&self) -> Option<String> {
        self.google_tts_access_token
            .clone()
            .or_else(|| env_non_empty("GOOGLE_TTS_ACCESS_TOKEN"))
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// ── Voice ────────────────────────────────────────────────────────────────

/// Audio container written by the speech stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" | "linear16" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(Pdf2VideoError::ConfigInvalid(format!(
                "unsupported audio format '{other}' (expected wav or mp3)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    #[default]
    Neutral,
    Male,
    Female,
}

impl VoiceGender {
    /// `SsmlVoiceGender` value used by Google Cloud TTS.
    pub fn ssml_name(self) -> &'static str {
        match self {
            VoiceGender::Neutral => "NEUTRAL",
            VoiceGender::Male => "MALE",
            VoiceGender::Female => "FEMALE",
        }
    }
}

impl FromStr for VoiceGender {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Ok(VoiceGender::Neutral),
            "male" => Ok(VoiceGender::Male),
            "female" => Ok(VoiceGender::Female),
            other => Err(Pdf2VideoError::ConfigInvalid(format!(
                "unsupported voice gender '{other}' (expected neutral, male or female)"
            ))),
        }
    }
}

/// Voice selection for speech synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// BCP-47 language tag. Default: "en-US".
    pub language_code: String,
    /// Vendor voice identifier. Default: "en-US-Neural2-D". Empty selects a
    /// voice by gender (Google only).
    pub voice_name: String,
    /// Used only when `voice_name` is empty.
    pub voice_gender: VoiceGender,
    /// Playback speed multiplier. Range: 0.25–4.0. Default: 1.0.
    pub speaking_rate: f64,
    pub audio_format: AudioFormat,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            voice_name: "en-US-Neural2-D".to_string(),
            voice_gender: VoiceGender::Neutral,
            speaking_rate: 1.0,
            audio_format: AudioFormat::Wav,
        }
    }
}

impl VoiceConfig {
    /// Reject settings no backend accepts, before any network call.
    pub fn validate(&self) -> Result<(), Pdf2VideoError> {
        if !self.speaking_rate.is_finite() || !SPEAKING_RATE_RANGE.contains(&self.speaking_rate) {
            return Err(Pdf2VideoError::ConfigInvalid(format!(
                "speaking_rate must be within {}–{}, got {}",
                SPEAKING_RATE_RANGE.start(),
                SPEAKING_RATE_RANGE.end(),
                self.speaking_rate
            )));
        }
        if self.language_code.trim().is_empty() {
            return Err(Pdf2VideoError::ConfigInvalid(
                "language_code must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Chirp3-HD voices reject an explicit gender.
    pub fn is_chirp_hd(&self) -> bool {
        self.voice_name.contains("Chirp3-HD")
    }
}

// ── Video ────────────────────────────────────────────────────────────────

/// Encoder settings passed through to the muxer unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettings {
    /// x264 CRF. Lower is better quality. Range: 0–51. Default: 23.
    pub quality: u8,
    /// x264 preset. Default: "medium".
    pub preset: String,
    /// Uniform multiplier for the first slide's dimensions. Default: 1.0.
    pub resolution_scale: f64,
    /// Output frame rate. Default: 24.
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    /// Mux the SRT into the MP4 as a `mov_text` track. Default: false.
    pub embed_subtitles: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            quality: 23,
            preset: "medium".to_string(),
            resolution_scale: 1.0,
            fps: 24,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            embed_subtitles: false,
        }
    }
}

impl VideoSettings {
    pub fn validate(&self) -> Result<(), Pdf2VideoError> {
        if !self.resolution_scale.is_finite() || self.resolution_scale <= 0.0 {
            return Err(Pdf2VideoError::ConfigInvalid(format!(
                "resolution_scale must be a positive number, got {}",
                self.resolution_scale
            )));
        }
        if self.quality > 51 {
            return Err(Pdf2VideoError::ConfigInvalid(format!(
                "video_quality (CRF) must be 0–51, got {}",
                self.quality
            )));
        }
        if self.fps == 0 {
            return Err(Pdf2VideoError::ConfigInvalid("fps must be ≥ 1".into()));
        }
        if self.preset.trim().is_empty() {
            return Err(Pdf2VideoError::ConfigInvalid(
                "video_preset must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ── TOML file ────────────────────────────────────────────────────────────

/// Settings as read from a TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    pub google_tts_api_key: Option<String>,
    pub google_tts_access_token: Option<String>,
    pub language_code: Option<String>,
    pub voice_name: Option<String>,
    pub voice_gender: Option<String>,
    pub speaking_rate: Option<f64>,
    pub audio_format: Option<String>,
    pub dpi: Option<u32>,
    pub max_rendered_pixels: Option<u32>,
    pub video_quality: Option<u8>,
    pub video_preset: Option<String>,
    pub resolution_scale: Option<f64>,
    pub fps: Option<u32>,
    pub embed_subtitles: Option<bool>,
    pub max_chars_per_cue: Option<usize>,
    pub narration_prompt: Option<String>,
    pub polish_prompt: Option<String>,
    pub polish_enabled: Option<bool>,
    pub concurrency: Option<usize>,
    pub api_timeout_secs: Option<u64>,
    pub mux_timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub pdfium_lib_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, Pdf2VideoError> {
        toml::from_str(text)
            .map_err(|e| Pdf2VideoError::ConfigInvalid(format!("config file: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, Pdf2VideoError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Pdf2VideoError::ConfigInvalid(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.dpi, 200);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.model(), "gemini-2.0-flash");
        assert_eq!(config.voice.voice_name, "en-US-Neural2-D");
        assert_eq!(config.video.quality, 23);
        assert_eq!(config.video.fps, 24);
        assert!(!config.polish_enabled);
    }

    #[test]
    fn speaking_rate_out_of_range_is_rejected() {
        for rate in [5.0, 0.1, f64::NAN, f64::INFINITY] {
            let err = PipelineConfig::builder().speaking_rate(rate).build();
            assert!(
                matches!(err, Err(Pdf2VideoError::ConfigInvalid(_))),
                "rate {rate} should be rejected"
            );
        }
        assert!(PipelineConfig::builder().speaking_rate(4.0).build().is_ok());
        assert!(PipelineConfig::builder().speaking_rate(0.25).build().is_ok());
    }

    #[test]
    fn resolution_scale_must_be_positive() {
        for scale in [0.0, -1.0, f64::NAN] {
            assert!(PipelineConfig::builder()
                .resolution_scale(scale)
                .build()
                .is_err());
        }
        assert!(PipelineConfig::builder().resolution_scale(0.5).build().is_ok());
    }

    #[test]
    fn polish_prompt_needs_current_placeholder() {
        assert!(PipelineConfig::builder()
            .polish_prompt("Rewrite this nicely.")
            .build()
            .is_err());
        assert!(PipelineConfig::builder()
            .polish_prompt("Rewrite: {current_content}")
            .build()
            .is_ok());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let file = FileConfig::from_toml_str(
            r#"
            provider = "openai"
            speaking_rate = 1.25
            audio_format = "mp3"
            voice_gender = "female"
            concurrency = 3
            embed_subtitles = true
            "#,
        )
        .unwrap();
        let config = PipelineConfig::builder()
            .apply_file(&file)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.voice.speaking_rate, 1.25);
        assert_eq!(config.voice.audio_format, AudioFormat::Mp3);
        assert_eq!(config.voice.voice_gender, VoiceGender::Female);
        assert_eq!(config.concurrency, 3);
        assert!(config.video.embed_subtitles);
    }

    #[test]
    fn later_builder_calls_win_over_file() {
        let file = FileConfig::from_toml_str("dpi = 150").unwrap();
        let config = PipelineConfig::builder()
            .apply_file(&file)
            .unwrap()
            .dpi(300)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 300);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FileConfig::from_toml_str("dpii = 150").is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let file = FileConfig::from_toml_str(r#"provider = "mistral""#).unwrap();
        assert!(PipelineConfig::builder().apply_file(&file).is_err());
    }

    #[test]
    fn chirp_voices_are_detected() {
        let voice = VoiceConfig {
            voice_name: "en-US-Chirp3-HD-Charon".into(),
            ..VoiceConfig::default()
        };
        assert!(voice.is_chirp_hd());
        assert!(!VoiceConfig::default().is_chirp_hd());
    }

    #[test]
    fn debug_redacts_credentials() {
        let creds = Credentials {
            openai_api_key: Some("sk-secret".into()),
            ..Credentials::default()
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }
}
