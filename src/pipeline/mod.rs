//! Pipeline stages for PDF-to-video conversion.
//!
//! Each submodule implements one transformation step. Stages never call each
//! other; they communicate only through the per-slide files described in
//! [`crate::layout`], and the orchestrator decides which slides each stage
//! touches.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ narrate ──▶ (polish) ──▶ speech ──▶ assemble
//! (path)    (pdfium)   (VLM)       (LLM)        (TTS)      (ffmpeg)
//!                        │            │
//!                        └──── postprocess (cleanup for speech)
//! ```
//!
//! 1. [`input`]  — validate the user-supplied path is a readable PDF
//! 2. [`render`] — rasterise slides to PNG; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — PNG-encode and base64-wrap images for the multimodal API
//! 4. [`narrate`] — one vision-LLM call per slide
//! 5. [`polish`]  — optional rewrite with neighbouring slides as context
//! 6. [`postprocess`] — deterministic cleanup of LLM replies into plain
//!    spoken text
//! 7. [`speech`]  — TTS per slide, duration measured from the audio
//! 8. [`assemble`] — subtitles plus the final video via [`media`] tooling

pub mod assemble;
pub mod encode;
pub mod input;
pub mod media;
pub mod narrate;
pub mod polish;
pub mod postprocess;
pub mod render;
pub mod speech;

/// Token usage of one successfully processed slide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlideOutcome {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
