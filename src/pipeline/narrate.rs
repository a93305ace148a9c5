//! Narration: slide image + prompt → spoken-style transcript.

use crate::error::{ProviderError, SlideError};
use crate::layout::{write_atomic, OutputLayout, Stage};
use crate::pipeline::postprocess::clean_narration;
use crate::pipeline::SlideOutcome;
use crate::prompts::narration_prompt;
use crate::providers::{Completion, NarrationProvider};
use std::sync::Arc;
use tracing::debug;

/// Generates one transcript per slide through a [`NarrationProvider`].
pub struct NarrationGenerator {
    provider: Arc<dyn NarrationProvider>,
    template: String,
    total_slides: usize,
}

impl NarrationGenerator {
    pub fn new(
        provider: Arc<dyn NarrationProvider>,
        template: impl Into<String>,
        total_slides: usize,
    ) -> Self {
        Self {
            provider,
            template: template.into(),
            total_slides,
        }
    }

    /// Describe one slide. The returned text is already cleaned for speech
    /// and guaranteed non-empty.
    pub async fn generate(&self, slide: usize, png: &[u8]) -> Result<Completion, SlideError> {
        let prompt = narration_prompt(&self.template, slide, self.total_slides);
        let reply = self
            .provider
            .describe_image(png, &prompt)
            .await
            .map_err(|e| match e {
                ProviderError::Timeout { secs } => SlideError::Timeout {
                    slide,
                    stage: Stage::Transcripts,
                    secs,
                },
                other => SlideError::NarrationFailed {
                    slide,
                    detail: other.to_string(),
                },
            })?;

        let text = clean_narration(&reply.text);
        if text.is_empty() {
            return Err(SlideError::NarrationFailed {
                slide,
                detail: format!("{} returned no usable text", self.provider.name()),
            });
        }
        Ok(Completion { text, ..reply })
    }

    /// Read the slide image, narrate it, and write the transcript.
    pub async fn run_slide(
        &self,
        layout: &OutputLayout,
        slide: usize,
    ) -> Result<SlideOutcome, SlideError> {
        let image_path = layout.image_path(slide);
        let png = tokio::fs::read(&image_path)
            .await
            .map_err(|e| SlideError::Io {
                slide,
                detail: format!("{}: {e}", image_path.display()),
            })?;

        let completion = self.generate(slide, &png).await?;

        let out = layout.transcript_path(slide);
        write_atomic(&out, completion.text.as_bytes())
            .await
            .map_err(|e| SlideError::Io {
                slide,
                detail: format!("{}: {e}", out.display()),
            })?;
        debug!("Slide {}: transcript {} chars", slide, completion.text.len());

        Ok(SlideOutcome {
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioFormat;
    use crate::prompts::DEFAULT_NARRATION_PROMPT;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, ProviderError>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NarrationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn describe_image(
            &self,
            _png: &[u8],
            prompt: &str,
        ) -> Result<Completion, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map(|text| Completion {
                text,
                input_tokens: 7,
                output_tokens: 3,
            })
        }

        async fn complete_text(&self, _prompt: &str) -> Result<Completion, ProviderError> {
            unreachable!()
        }
    }

    fn generator(reply: Result<String, ProviderError>) -> (NarrationGenerator, Arc<Scripted>) {
        let provider = Arc::new(Scripted {
            reply,
            prompts: Mutex::new(Vec::new()),
        });
        (
            NarrationGenerator::new(provider.clone(), DEFAULT_NARRATION_PROMPT, 4),
            provider,
        )
    }

    #[tokio::test]
    async fn reply_is_cleaned_and_prompt_interpolated() {
        let (gen, provider) = generator(Ok("## Intro\n**Welcome** everyone.".into()));
        let c = gen.generate(2, b"png").await.unwrap();
        assert_eq!(c.text, "Intro Welcome everyone.");
        assert_eq!(c.input_tokens, 7);
        assert!(provider.prompts.lock().unwrap()[0].contains("slide 2 of 4"));
    }

    #[tokio::test]
    async fn empty_reply_is_a_failure() {
        let (gen, _) = generator(Ok("```\n```".into()));
        let err = gen.generate(1, b"png").await.unwrap_err();
        assert!(matches!(err, SlideError::NarrationFailed { slide: 1, .. }));
    }

    #[tokio::test]
    async fn timeout_maps_to_slide_timeout() {
        let (gen, _) = generator(Err(ProviderError::Timeout { secs: 30 }));
        let err = gen.generate(3, b"png").await.unwrap_err();
        assert_eq!(
            err,
            SlideError::Timeout {
                slide: 3,
                stage: Stage::Transcripts,
                secs: 30
            }
        );
    }

    #[tokio::test]
    async fn failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), 1, AudioFormat::Wav);
        write_atomic(&layout.image_path(1), b"png").await.unwrap();

        let (gen, _) = generator(Err(ProviderError::Api {
            provider: "scripted".into(),
            message: "HTTP 500".into(),
        }));
        assert!(gen.run_slide(&layout, 1).await.is_err());
        assert!(!layout.transcript_path(1).exists());
    }
}
