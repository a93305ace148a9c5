//! Polishing: rewrite each transcript with its neighbours as context.
//!
//! Context is snapshotted once when the stage starts. The previous slide's
//! context is its polished text if that file already existed at that moment,
//! otherwise its raw text; the next slide's context is always raw. Slides
//! polished concurrently during this run therefore never see each other's
//! fresh output, which keeps the result independent of scheduling order.

use crate::error::{ProviderError, SlideError};
use crate::layout::{is_complete, write_atomic, OutputLayout, Stage};
use crate::pipeline::postprocess::clean_narration;
use crate::pipeline::SlideOutcome;
use crate::prompts::polish_prompt;
use crate::providers::{Completion, NarrationProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Transcript text visible to the polisher, captured at stage start.
#[derive(Debug, Clone, Default)]
pub struct PolishContext {
    raw: BTreeMap<usize, String>,
    polished: BTreeMap<usize, String>,
}

impl PolishContext {
    /// Read every raw transcript and every already-polished transcript.
    pub async fn snapshot(layout: &OutputLayout) -> std::io::Result<Self> {
        let mut ctx = Self::default();
        for slide in layout.slides() {
            let raw = tokio::fs::read_to_string(layout.transcript_path(slide)).await?;
            ctx.raw.insert(slide, raw.trim().to_string());

            let polished = layout.polished_path(slide);
            if is_complete(&polished).await {
                let text = tokio::fs::read_to_string(&polished).await?;
                if !text.trim().is_empty() {
                    ctx.polished.insert(slide, text.trim().to_string());
                }
            }
        }
        Ok(ctx)
    }

    pub fn from_parts(raw: BTreeMap<usize, String>, polished: BTreeMap<usize, String>) -> Self {
        Self { raw, polished }
    }

    pub fn raw(&self, slide: usize) -> Option<&str> {
        self.raw.get(&slide).map(String::as_str)
    }

    /// `(previous, next)` context for `slide`; `None` at the deck edges.
    pub fn neighbours(&self, slide: usize) -> (Option<&str>, Option<&str>) {
        let previous = slide.checked_sub(1).filter(|&p| p >= 1).and_then(|p| {
            self.polished
                .get(&p)
                .or_else(|| self.raw.get(&p))
                .map(String::as_str)
        });
        let next = self.raw.get(&(slide + 1)).map(String::as_str);
        (previous, next)
    }
}

/// Rewrites transcripts through the narration provider's text completion.
pub struct TranscriptPolisher {
    provider: Arc<dyn NarrationProvider>,
    template: String,
}

impl TranscriptPolisher {
    pub fn new(provider: Arc<dyn NarrationProvider>, template: impl Into<String>) -> Self {
        Self {
            provider,
            template: template.into(),
        }
    }

    /// Polish `current`; a missing neighbour is replaced by its placeholder.
    pub async fn polish(
        &self,
        slide: usize,
        previous: Option<&str>,
        current: &str,
        next: Option<&str>,
    ) -> Result<Completion, SlideError> {
        let prompt = polish_prompt(&self.template, previous, current, next);
        let reply = self
            .provider
            .complete_text(&prompt)
            .await
            .map_err(|e| match e {
                ProviderError::Timeout { secs } => SlideError::Timeout {
                    slide,
                    stage: Stage::Polish,
                    secs,
                },
                other => SlideError::PolishFailed {
                    slide,
                    detail: other.to_string(),
                },
            })?;

        let text = clean_narration(&reply.text);
        if text.is_empty() {
            return Err(SlideError::PolishFailed {
                slide,
                detail: format!("{} returned no usable text", self.provider.name()),
            });
        }
        Ok(Completion { text, ..reply })
    }

    /// Polish one slide from the snapshot and write the result.
    pub async fn run_slide(
        &self,
        ctx: &PolishContext,
        layout: &OutputLayout,
        slide: usize,
    ) -> Result<SlideOutcome, SlideError> {
        let current = ctx.raw(slide).ok_or_else(|| SlideError::Io {
            slide,
            detail: "raw transcript missing from snapshot".into(),
        })?;
        let (previous, next) = ctx.neighbours(slide);

        let completion = self.polish(slide, previous, current, next).await?;

        let out = layout.polished_path(slide);
        write_atomic(&out, completion.text.as_bytes())
            .await
            .map_err(|e| SlideError::Io {
                slide,
                detail: format!("{}: {e}", out.display()),
            })?;
        debug!("Slide {}: polished {} chars", slide, completion.text.len());

        Ok(SlideOutcome {
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PolishContext {
        let raw = (1..=3)
            .map(|i| (i, format!("raw {i}")))
            .collect::<BTreeMap<_, _>>();
        let polished = [(1, "polished 1".to_string())].into_iter().collect();
        PolishContext::from_parts(raw, polished)
    }

    #[test]
    fn first_slide_has_no_previous() {
        assert_eq!(ctx().neighbours(1), (None, Some("raw 2")));
    }

    #[test]
    fn previous_prefers_existing_polished_text() {
        assert_eq!(ctx().neighbours(2), (Some("polished 1"), Some("raw 3")));
    }

    #[test]
    fn last_slide_has_no_next() {
        assert_eq!(ctx().neighbours(3), (Some("raw 2"), None));
    }
}
