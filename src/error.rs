//! Error types for the edgequake-pdf2video library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`Pdf2VideoError`] — **Fatal**: the run cannot proceed (bad input file,
//!   invalid configuration, a prerequisite stage is incomplete, video
//!   assembly failed). Returned as `Err(Pdf2VideoError)` from
//!   [`crate::orchestrator::Pipeline::run`].
//!
//! * [`SlideError`] — **Non-fatal**: one slide failed inside a per-slide
//!   stage (narration, polish, speech). Recorded in the
//!   [`crate::report::StageReport`]; the other slides keep going. Re-running
//!   the same step retries only the failed slides.
//!
//! * [`ProviderError`] — what a narration or speech provider implementation
//!   returns. The stage wraps it into a [`SlideError`] carrying the slide index.

use crate::layout::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2video library.
#[derive(Debug, Error)]
pub enum Pdf2VideoError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nDecrypt it first: qpdf --decrypt --password=<PASSWORD> input.pdf output.pdf")]
    PasswordRequired { path: PathBuf },

    /// The document opened but contains no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for slide {slide}: {detail}")]
    RasterisationFailed { slide: usize, detail: String },

    // ── Orchestration errors ──────────────────────────────────────────────
    /// A step was requested but an earlier stage's outputs are not complete.
    #[error(
        "Cannot run '{step}': stage '{missing}' is incomplete for slides {slides:?}\n\
Run `--step {missing}` first (completed slides are skipped)."
    )]
    MissingPrerequisite {
        step: Stage,
        missing: Stage,
        slides: Vec<usize>,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A per-slide asset needed for the video is missing or unreadable.
    #[error("Video assembly failed at slide {slide}: {reason}")]
    AssemblyFailed { slide: usize, reason: String },

    /// The muxer itself failed (encoder error, concat failure, timeout).
    #[error("Video muxing failed: {detail}")]
    MuxFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file or directory.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Configuration validation failed (bad voice rate, missing credentials,
    /// unsupported provider, unreadable config file…).
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, or point PDFIUM_LIB_PATH at an existing\n\
copy of libpdfium (pre-built binaries: https://github.com/bblanchon/pdfium-binaries).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Per-slide ─────────────────────────────────────────────────────────
    /// A per-slide failure surfaced by a single-slide operation such as
    /// [`crate::pipeline::speech::SpeechSynthesizer::synthesize`].
    #[error(transparent)]
    Slide(#[from] SlideError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2VideoError {
    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Pdf2VideoError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal error for a single slide within a per-slide stage.
///
/// Every variant carries the 1-based slide index and the underlying cause.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum SlideError {
    /// The narration provider failed to describe the slide.
    #[error("Slide {slide}: narration failed: {detail}")]
    NarrationFailed { slide: usize, detail: String },

    /// The polishing completion failed.
    #[error("Slide {slide}: polishing failed: {detail}")]
    PolishFailed { slide: usize, detail: String },

    /// The TTS provider failed or produced unusable audio.
    #[error("Slide {slide}: speech synthesis failed: {detail}")]
    SynthesisFailed { slide: usize, detail: String },

    /// A provider call exceeded its timeout.
    #[error("Slide {slide}: {stage} call timed out after {secs}s")]
    Timeout { slide: usize, stage: Stage, secs: u64 },

    /// Reading an input or writing the output file failed.
    #[error("Slide {slide}: I/O error: {detail}")]
    Io { slide: usize, detail: String },
}

impl SlideError {
    /// The 1-based slide index this error belongs to.
    pub fn slide(&self) -> usize {
        match self {
            SlideError::NarrationFailed { slide, .. }
            | SlideError::PolishFailed { slide, .. }
            | SlideError::SynthesisFailed { slide, .. }
            | SlideError::Timeout { slide, .. }
            | SlideError::Io { slide, .. } => *slide,
        }
    }
}

/// Error returned by [`crate::providers::NarrationProvider`] and
/// [`crate::providers::SpeechProvider`] implementations.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The vendor API returned an error (HTTP status, quota, content policy…).
    #[error("{provider} API error: {message}")]
    Api { provider: String, message: String },

    /// The call did not complete within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The call succeeded but the payload could not be used.
    #[error("invalid response from {provider}: {detail}")]
    InvalidResponse { provider: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_prerequisite_names_both_stages() {
        let e = Pdf2VideoError::MissingPrerequisite {
            step: Stage::Audio,
            missing: Stage::Transcripts,
            slides: vec![2, 4],
        };
        let msg = e.to_string();
        assert!(msg.contains("'audio'"), "got: {msg}");
        assert!(msg.contains("'transcripts'"), "got: {msg}");
        assert!(msg.contains("[2, 4]"), "got: {msg}");
    }

    #[test]
    fn assembly_failed_display() {
        let e = Pdf2VideoError::AssemblyFailed {
            slide: 7,
            reason: "audio file missing".into(),
        };
        assert!(e.to_string().contains("slide 7"));
        assert!(e.to_string().contains("audio file missing"));
    }

    #[test]
    fn slide_error_reports_index() {
        let e = SlideError::SynthesisFailed {
            slide: 3,
            detail: "quota".into(),
        };
        assert_eq!(e.slide(), 3);
        assert!(e.to_string().contains("Slide 3"));

        let t = SlideError::Timeout {
            slide: 5,
            stage: Stage::Transcripts,
            secs: 60,
        };
        assert_eq!(t.slide(), 5);
        assert!(t.to_string().contains("60s"));
    }

    #[test]
    fn provider_error_display() {
        let e = ProviderError::Api {
            provider: "openai".into(),
            message: "HTTP 429".into(),
        };
        assert!(e.to_string().contains("openai"));
        assert!(e.to_string().contains("429"));
    }
}
