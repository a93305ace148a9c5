//! Speech synthesis: transcript → audio file with a measured duration.

use crate::config::VoiceConfig;
use crate::error::{Pdf2VideoError, ProviderError, SlideError};
use crate::layout::{write_atomic, OutputLayout, Stage};
use crate::pipeline::media::audio_bytes_duration;
use crate::pipeline::SlideOutcome;
use crate::providers::SpeechProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Audio produced for one slide.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

/// Drives a [`SpeechProvider`] and measures what it returns.
pub struct SpeechSynthesizer {
    provider: Arc<dyn SpeechProvider>,
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl SpeechSynthesizer {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        ffprobe: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            ffprobe: ffprobe.into(),
            probe_timeout,
        }
    }

    /// Synthesise `text` for `slide`.
    ///
    /// The voice is validated before the provider is called; an invalid
    /// voice yields [`Pdf2VideoError::ConfigInvalid`] and no request is made.
    /// Provider or measurement failures come back as
    /// [`Pdf2VideoError::Slide`].
    pub async fn synthesize(
        &self,
        slide: usize,
        text: &str,
        voice: &VoiceConfig,
    ) -> Result<SynthesizedAudio, Pdf2VideoError> {
        voice.validate()?;
        if text.trim().is_empty() {
            return Err(SlideError::SynthesisFailed {
                slide,
                detail: "transcript is empty".into(),
            }
            .into());
        }

        let bytes = self
            .provider
            .synthesize(text, voice)
            .await
            .map_err(|e| match e {
                ProviderError::Timeout { secs } => SlideError::Timeout {
                    slide,
                    stage: Stage::Audio,
                    secs,
                },
                other => SlideError::SynthesisFailed {
                    slide,
                    detail: other.to_string(),
                },
            })?;

        let duration =
            audio_bytes_duration(&bytes, voice.audio_format, &self.ffprobe, self.probe_timeout)
                .await
                .map_err(|e| SlideError::SynthesisFailed {
                    slide,
                    detail: format!("cannot measure audio duration: {e}"),
                })?;
        if duration.is_zero() {
            return Err(SlideError::SynthesisFailed {
                slide,
                detail: "audio has zero duration".into(),
            }
            .into());
        }

        Ok(SynthesizedAudio { bytes, duration })
    }

    /// Synthesise the preferred transcript of one slide and write the audio.
    pub async fn run_slide(
        &self,
        layout: &OutputLayout,
        voice: &VoiceConfig,
        slide: usize,
    ) -> Result<SlideOutcome, SlideError> {
        let text = layout
            .preferred_transcript(slide)
            .await
            .map_err(|e| SlideError::Io {
                slide,
                detail: format!("reading transcript: {e}"),
            })?;

        let audio = self
            .synthesize(slide, &text, voice)
            .await
            .map_err(|e| match e {
                Pdf2VideoError::Slide(e) => e,
                other => SlideError::SynthesisFailed {
                    slide,
                    detail: other.to_string(),
                },
            })?;

        let out = layout.audio_path(slide);
        write_atomic(&out, &audio.bytes)
            .await
            .map_err(|e| SlideError::Io {
                slide,
                detail: format!("{}: {e}", out.display()),
            })?;
        debug!("Slide {}: {:?} of audio", slide, audio.duration);

        Ok(SlideOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTts {
        calls: AtomicUsize,
        reply: Result<Vec<u8>, ProviderError>,
    }

    #[async_trait]
    impl SpeechProvider for CountingTts {
        fn name(&self) -> &str {
            "counting"
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice: &VoiceConfig,
        ) -> Result<Vec<u8>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn wav(samples: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                w.write_sample(0i16).unwrap();
            }
            w.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn synthesizer(reply: Result<Vec<u8>, ProviderError>) -> (SpeechSynthesizer, Arc<CountingTts>) {
        let tts = Arc::new(CountingTts {
            calls: AtomicUsize::new(0),
            reply,
        });
        let s = SpeechSynthesizer::new(tts.clone(), "ffprobe", Duration::from_secs(5));
        (s, tts)
    }

    #[tokio::test]
    async fn measures_wav_duration() {
        let (s, tts) = synthesizer(Ok(wav(24_000)));
        let audio = s
            .synthesize(1, "Hello there.", &VoiceConfig::default())
            .await
            .unwrap();
        assert_eq!(audio.duration, Duration::from_millis(1_500));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_rate_never_reaches_the_provider() {
        let (s, tts) = synthesizer(Ok(wav(16_000)));
        let voice = VoiceConfig {
            speaking_rate: 5.0,
            ..VoiceConfig::default()
        };
        let err = s.synthesize(1, "Hello.", &voice).await.unwrap_err();
        assert!(matches!(err, Pdf2VideoError::ConfigInvalid(_)), "{err}");
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_text_is_a_slide_failure() {
        let (s, tts) = synthesizer(Ok(wav(16_000)));
        let err = s
            .synthesize(4, "  \n", &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2VideoError::Slide(SlideError::SynthesisFailed { slide: 4, .. })
        ));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_length_audio_is_rejected() {
        let (s, _) = synthesizer(Ok(wav(0)));
        let err = s
            .synthesize(2, "Hello.", &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("zero duration"), "{err}");
    }

    #[tokio::test]
    async fn provider_timeout_maps_to_slide_timeout() {
        let (s, _) = synthesizer(Err(ProviderError::Timeout { secs: 30 }));
        let err = s
            .synthesize(3, "Hello.", &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2VideoError::Slide(SlideError::Timeout {
                slide: 3,
                stage: Stage::Audio,
                secs: 30
            })
        ));
    }

    #[tokio::test]
    async fn run_slide_prefers_polished_text() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), 1, Default::default());
        layout.ensure_dirs().await.unwrap();
        tokio::fs::write(layout.transcript_path(1), "raw").await.unwrap();
        tokio::fs::write(layout.polished_path(1), "polished").await.unwrap();

        let (s, tts) = synthesizer(Ok(wav(8_000)));
        s.run_slide(&layout, &VoiceConfig::default(), 1).await.unwrap();
        assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
        let written = tokio::fs::read(layout.audio_path(1)).await.unwrap();
        assert_eq!(written, wav(8_000));
    }
}
