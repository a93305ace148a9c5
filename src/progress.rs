//! Progress-callback trait for per-stage and per-slide pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::orchestrator::PipelineBuilder::progress_callback`] to receive
//! events as each stage walks its work set. The CLI renders them with an
//! `indicatif` bar; library users can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2video::{PipelineProgressCallback, Stage};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_slide_complete(&self, stage: Stage, slide: usize, total: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{stage}: slide {slide} done ({n}/{total})");
//!     }
//! }
//! ```

use crate::layout::Stage;
use std::sync::Arc;

/// Called by the orchestrator as it runs each stage.
///
/// Implementations must be `Send + Sync`: within narration, polish and speech
/// the per-slide methods may be called concurrently from different tasks.
/// All methods have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once per executed stage, before any slide is processed.
    ///
    /// # Arguments
    /// * `stage`   — the stage starting
    /// * `pending` — slides in the work set (already-complete ones excluded)
    /// * `total`   — slides in the deck
    fn on_stage_start(&self, stage: Stage, pending: usize, total: usize) {
        let _ = (stage, pending, total);
    }

    /// Called just before the provider call for a slide.
    fn on_slide_start(&self, stage: Stage, slide: usize, total: usize) {
        let _ = (stage, slide, total);
    }

    /// Called when a slide's output has been written.
    fn on_slide_complete(&self, stage: Stage, slide: usize, total: usize) {
        let _ = (stage, slide, total);
    }

    /// Called when a slide fails. The stage keeps going.
    fn on_slide_error(&self, stage: Stage, slide: usize, error: &str) {
        let _ = (stage, slide, error);
    }

    /// Called once the stage's whole work set has been attempted.
    ///
    /// # Arguments
    /// * `succeeded` — slides written in this run
    /// * `failed`    — slides that failed in this run
    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        let _ = (stage, succeeded, failed);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
