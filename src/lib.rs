//! # edgequake-pdf2video
//!
//! Turn a PDF slide deck into a narrated video with subtitles.
//!
//! Each page is rasterised, described by a vision language model, optionally
//! polished for narrative flow, spoken by a text-to-speech engine, and
//! finally stitched into an MP4 where every slide stays on screen exactly as
//! long as its narration. An SRT subtitle file is written next to it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. images       rasterise slides via pdfium   → images/slide_NN.png
//!  ├─ 2. transcripts  vision LLM narration          → transcripts/slide_NN.txt
//!  ├─ 3. polish       optional contextual rewrite   → polished_transcripts/slide_NN.txt
//!  ├─ 4. audio        text-to-speech                → audio/slide_NN.wav
//!  └─ 5. video        ffmpeg mux + subtitles        → final_video.mp4 / .srt
//! ```
//!
//! Stages communicate only through these files. Every run re-derives what is
//! left to do from the output directory, so an interrupted or partially
//! failed run is resumed by running it again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2video::{all_steps, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from GEMINI_API_KEY and GOOGLE_TTS_API_KEY.
//!     let config = PipelineConfig::builder().speaking_rate(1.1).build()?;
//!     let pipeline = Pipeline::builder("deck.pdf", "output").config(config).build();
//!     let report = pipeline.run(&all_steps(false), 8).await?;
//!     for stage in &report.stages {
//!         eprintln!("{stage}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2video` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External tools
//!
//! The `video` stage (and duration probing of MP3 audio) needs `ffmpeg` and
//! `ffprobe` on `PATH`, or configured via `ffmpeg_path` / `ffprobe_path`.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod report;
pub mod subtitle;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AudioFormat, Credentials, FileConfig, PipelineConfig, PipelineConfigBuilder, ProviderKind,
    TtsProviderKind, VideoSettings, VoiceConfig, VoiceGender,
};
pub use error::{Pdf2VideoError, ProviderError, SlideError};
pub use layout::{OutputLayout, Stage};
pub use orchestrator::{all_steps, parse_steps, Pipeline, PipelineBuilder};
pub use pipeline::assemble::{FfmpegMuxer, MuxJob, Segment, VideoMuxer};
pub use pipeline::render::{PdfiumRenderer, SlideRenderer};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use providers::{Completion, NarrationProvider, SpeechProvider};
pub use report::{RunReport, SlideFailure, SlideStatus, StageReport};
pub use subtitle::{build_cues, render_srt, SubtitleCue};
