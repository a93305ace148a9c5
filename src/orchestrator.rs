//! Stage sequencing, resumability and the per-slide worker pool.
//!
//! [`Pipeline::run`] never trusts a saved state: before each stage it looks
//! at the output directory, skips slides whose output file already exists
//! and is non-empty, and dispatches the rest. A stage with failed slides
//! halts the run after the stage finishes; re-running the same step picks up
//! exactly the slides that are still missing.

use crate::config::PipelineConfig;
use crate::error::{Pdf2VideoError, SlideError};
use crate::layout::{write_atomic, OutputLayout, Stage};
use crate::pipeline::assemble::{video_is_current, FfmpegMuxer, VideoAssembler, VideoMuxer};
use crate::pipeline::input::resolve_input;
use crate::pipeline::narrate::NarrationGenerator;
use crate::pipeline::polish::{PolishContext, TranscriptPolisher};
use crate::pipeline::render::{PdfiumRenderer, SlideRenderer};
use crate::pipeline::speech::SpeechSynthesizer;
use crate::pipeline::SlideOutcome;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts::{DEFAULT_NARRATION_PROMPT, DEFAULT_POLISH_PROMPT};
use crate::providers::{
    create_narration_provider, create_speech_provider, NarrationProvider, SpeechProvider,
};
use crate::report::{RunReport, SlideStatus, StageReport, StatusBoard};
use futures::stream::{self, StreamExt};
use once_cell::sync::OnceCell;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parse a step selection: `all`, or one or more comma-separated stage names.
///
/// `all` expands to every stage, with `polish` included only when
/// `polish_enabled` is set.
pub fn parse_steps(selection: &str, polish_enabled: bool) -> Result<Vec<Stage>, Pdf2VideoError> {
    if selection.trim().eq_ignore_ascii_case("all") {
        return Ok(all_steps(polish_enabled));
    }
    let mut steps = selection
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Stage>, _>>()?;
    if steps.is_empty() {
        return Err(Pdf2VideoError::ConfigInvalid("no step selected".into()));
    }
    steps.sort();
    steps.dedup();
    Ok(steps)
}

/// Every stage an `all` run executes.
pub fn all_steps(polish_enabled: bool) -> Vec<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|&s| s != Stage::Polish || polish_enabled)
        .collect()
}

/// A configured conversion of one PDF into one output directory.
///
/// Providers are created on first use, so a run that only rasterises needs
/// no credentials.
pub struct Pipeline {
    input: PathBuf,
    output_dir: PathBuf,
    config: PipelineConfig,
    renderer: Arc<dyn SlideRenderer>,
    narrator: OnceCell<Arc<dyn NarrationProvider>>,
    speech: OnceCell<Arc<dyn SpeechProvider>>,
    muxer: Arc<dyn VideoMuxer>,
    progress: ProgressCallback,
}

impl Pipeline {
    pub fn builder(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder {
            input: input.into(),
            output_dir: output_dir.into(),
            config: None,
            renderer: None,
            narrator: None,
            speech: None,
            muxer: None,
            progress: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Execute `steps` in pipeline order with at most `concurrency` slides in
    /// flight per stage.
    ///
    /// # Returns
    /// `Ok(RunReport)` whenever every executed stage ran to completion, even
    /// if some slides failed (check [`RunReport::is_success`]).
    ///
    /// # Errors
    /// Fatal errors only: invalid input PDF, missing prerequisites, invalid
    /// configuration, rasterisation or assembly failure.
    pub async fn run(
        &self,
        steps: &[Stage],
        concurrency: usize,
    ) -> Result<RunReport, Pdf2VideoError> {
        let (report, result) = self.execute(steps, concurrency).await;
        result.map(|()| report)
    }

    /// Same as [`Pipeline::run`], but a fatal error still hands back the
    /// reports of the stages that finished before it.
    pub async fn execute(
        &self,
        steps: &[Stage],
        concurrency: usize,
    ) -> (RunReport, Result<(), Pdf2VideoError>) {
        let mut report = RunReport::default();
        let result = self.run_into(&mut report, steps, concurrency).await;
        (report, result)
    }

    async fn run_into(
        &self,
        report: &mut RunReport,
        steps: &[Stage],
        concurrency: usize,
    ) -> Result<(), Pdf2VideoError> {
        let mut steps = steps.to_vec();
        steps.sort();
        steps.dedup();
        if steps.is_empty() {
            return Err(Pdf2VideoError::ConfigInvalid("no step selected".into()));
        }
        let concurrency = concurrency.max(1);

        let pdf = resolve_input(&self.input)?;
        let total = self.renderer.page_count(&pdf).await?;
        if total == 0 {
            return Err(Pdf2VideoError::EmptyDocument { path: pdf });
        }
        info!(
            "{}: {} slides, steps {:?}, concurrency {}",
            pdf.display(),
            total,
            steps,
            concurrency
        );

        let layout = OutputLayout::new(&self.output_dir, total, self.config.voice.audio_format);
        layout.ensure_dirs().await?;

        for stage in steps {
            check_prerequisites(&layout, stage).await?;

            let stage_report = match stage {
                Stage::Images => self.run_images(&pdf, &layout).await?,
                Stage::Transcripts => self.run_transcripts(&layout, concurrency).await?,
                Stage::Polish => self.run_polish(&layout, concurrency).await?,
                Stage::Audio => self.run_audio(&layout, concurrency).await?,
                Stage::Video => self.run_video(&layout).await?,
            };
            info!("{}", stage_report);

            let failed = !stage_report.is_success();
            if failed {
                warn!(
                    "Stage '{}' failed for slides {:?}; halting",
                    stage,
                    stage_report.failed_slides()
                );
            }
            report.stages.push(stage_report);
            if failed {
                report.halted_at = Some(stage);
                break;
            }
        }
        Ok(())
    }

    // ── Stages ───────────────────────────────────────────────────────────

    async fn run_images(
        &self,
        pdf: &Path,
        layout: &OutputLayout,
    ) -> Result<StageReport, Pdf2VideoError> {
        let started = Instant::now();
        let total = layout.slide_count();
        let pending = layout.incomplete_slides(Stage::Images).await;
        let board = StatusBoard::new(total, &pending);
        self.progress.on_stage_start(Stage::Images, pending.len(), total);

        if !pending.is_empty() {
            let rendered = self.renderer.render(pdf, &pending).await?;
            for (slide, png) in rendered {
                let path = layout.image_path(slide);
                write_atomic(&path, &png)
                    .await
                    .map_err(|e| Pdf2VideoError::write_failed(&path, e))?;
                board.set(slide, SlideStatus::Done);
                self.progress.on_slide_complete(Stage::Images, slide, total);
                debug!("Slide {}: wrote {} bytes of PNG", slide, png.len());
            }
        }

        let report = board.into_report(Stage::Images, elapsed_ms(started));
        self.progress
            .on_stage_complete(Stage::Images, report.succeeded, report.failed.len());
        Ok(report)
    }

    async fn run_transcripts(
        &self,
        layout: &OutputLayout,
        concurrency: usize,
    ) -> Result<StageReport, Pdf2VideoError> {
        let pending = layout.incomplete_slides(Stage::Transcripts).await;
        if pending.is_empty() {
            return Ok(self.nothing_to_do(Stage::Transcripts, layout.slide_count()));
        }
        let template = self
            .config
            .narration_prompt
            .as_deref()
            .unwrap_or(DEFAULT_NARRATION_PROMPT);
        let generator = NarrationGenerator::new(self.narrator()?, template, layout.slide_count());
        let generator = &generator;
        Ok(self
            .run_slides(Stage::Transcripts, layout.slide_count(), pending, concurrency, |slide| {
                generator.run_slide(layout, slide)
            })
            .await)
    }

    async fn run_polish(
        &self,
        layout: &OutputLayout,
        concurrency: usize,
    ) -> Result<StageReport, Pdf2VideoError> {
        let pending = layout.incomplete_slides(Stage::Polish).await;
        if pending.is_empty() {
            return Ok(self.nothing_to_do(Stage::Polish, layout.slide_count()));
        }
        let ctx = PolishContext::snapshot(layout)
            .await
            .map_err(|e| Pdf2VideoError::Internal(format!("reading transcripts: {e}")))?;
        let template = self
            .config
            .polish_prompt
            .as_deref()
            .unwrap_or(DEFAULT_POLISH_PROMPT);
        let polisher = TranscriptPolisher::new(self.narrator()?, template);
        let (polisher, ctx) = (&polisher, &ctx);
        Ok(self
            .run_slides(Stage::Polish, layout.slide_count(), pending, concurrency, |slide| {
                polisher.run_slide(ctx, layout, slide)
            })
            .await)
    }

    async fn run_audio(
        &self,
        layout: &OutputLayout,
        concurrency: usize,
    ) -> Result<StageReport, Pdf2VideoError> {
        let voice = &self.config.voice;
        voice.validate()?;

        let stale = layout.stale_audio_slides().await;
        if !stale.is_empty() {
            warn!(
                "Polished transcripts are newer than the audio of slides {:?}; \
                 delete those audio files to synthesize them again",
                stale
            );
        }

        let pending = layout.incomplete_slides(Stage::Audio).await;
        if pending.is_empty() {
            return Ok(self.nothing_to_do(Stage::Audio, layout.slide_count()));
        }
        let synthesizer = SpeechSynthesizer::new(
            self.speech()?,
            self.config.ffprobe_path.clone(),
            self.config.mux_timeout(),
        );
        let synthesizer = &synthesizer;
        Ok(self
            .run_slides(Stage::Audio, layout.slide_count(), pending, concurrency, |slide| {
                synthesizer.run_slide(layout, voice, slide)
            })
            .await)
    }

    async fn run_video(&self, layout: &OutputLayout) -> Result<StageReport, Pdf2VideoError> {
        let started = Instant::now();
        let total = layout.slide_count();

        if video_is_current(layout).await {
            info!("{} is up to date", layout.video_path().display());
            return Ok(self.nothing_to_do(Stage::Video, total));
        }

        let all: Vec<usize> = layout.slides().collect();
        let board = StatusBoard::new(total, &all);
        self.progress.on_stage_start(Stage::Video, total, total);

        let assembler = VideoAssembler::new(
            Arc::clone(&self.muxer),
            self.config.video.clone(),
            self.config.max_chars_per_cue,
            self.config.ffprobe_path.clone(),
            self.config.mux_timeout(),
        );
        let out = assembler.assemble(layout).await?;
        info!(
            "Wrote {} ({:?}, {} subtitle cues)",
            out.video.display(),
            out.duration,
            out.cue_count
        );

        for slide in all {
            board.set(slide, SlideStatus::Done);
        }
        let report = board.into_report(Stage::Video, elapsed_ms(started));
        self.progress
            .on_stage_complete(Stage::Video, report.succeeded, report.failed.len());
        Ok(report)
    }

    /// Drive `work` over `pending` with at most `concurrency` slides in
    /// flight. Failures are recorded and never stop the other slides.
    async fn run_slides<F, Fut>(
        &self,
        stage: Stage,
        total: usize,
        pending: Vec<usize>,
        concurrency: usize,
        work: F,
    ) -> StageReport
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<SlideOutcome, SlideError>>,
    {
        let started = Instant::now();
        let board = StatusBoard::new(total, &pending);
        info!(
            "Stage '{}': {} of {} slides pending",
            stage,
            pending.len(),
            total
        );
        self.progress.on_stage_start(stage, pending.len(), total);

        let (board_ref, work, progress) = (&board, &work, &self.progress);
        stream::iter(pending.into_iter().map(|slide| async move {
            board_ref.set(slide, SlideStatus::InProgress);
            progress.on_slide_start(stage, slide, total);
            match work(slide).await {
                Ok(outcome) => {
                    board_ref.add_tokens(outcome.input_tokens, outcome.output_tokens);
                    board_ref.set(slide, SlideStatus::Done);
                    progress.on_slide_complete(stage, slide, total);
                }
                Err(e) => {
                    warn!("{}", e);
                    progress.on_slide_error(stage, slide, &e.to_string());
                    board_ref.set(slide, SlideStatus::Failed(e));
                }
            }
        }))
        .buffer_unordered(concurrency)
        .collect::<Vec<()>>()
        .await;

        let report = board.into_report(stage, elapsed_ms(started));
        self.progress
            .on_stage_complete(stage, report.succeeded, report.failed.len());
        report
    }

    /// Report for a stage whose outputs are all present already.
    fn nothing_to_do(&self, stage: Stage, total: usize) -> StageReport {
        debug!("Stage '{}': all {} slides complete, skipping", stage, total);
        self.progress.on_stage_start(stage, 0, total);
        let report = StatusBoard::new(total, &[]).into_report(stage, 0);
        self.progress.on_stage_complete(stage, 0, 0);
        report
    }

    fn narrator(&self) -> Result<Arc<dyn NarrationProvider>, Pdf2VideoError> {
        self.narrator
            .get_or_try_init(|| create_narration_provider(&self.config))
            .map(Arc::clone)
    }

    fn speech(&self) -> Result<Arc<dyn SpeechProvider>, Pdf2VideoError> {
        self.speech
            .get_or_try_init(|| create_speech_provider(&self.config))
            .map(Arc::clone)
    }
}

/// Fail with the first stage, in pipeline order, that `stage` depends on and
/// that is incomplete for some slide.
async fn check_prerequisites(layout: &OutputLayout, stage: Stage) -> Result<(), Pdf2VideoError> {
    for &missing in stage.prerequisites() {
        let slides = layout.incomplete_slides(missing).await;
        if !slides.is_empty() {
            return Err(Pdf2VideoError::MissingPrerequisite {
                step: stage,
                missing,
                slides,
            });
        }
    }
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Builder for [`Pipeline`]. Every collaborator not set explicitly is the
/// production implementation chosen from the config.
pub struct PipelineBuilder {
    input: PathBuf,
    output_dir: PathBuf,
    config: Option<PipelineConfig>,
    renderer: Option<Arc<dyn SlideRenderer>>,
    narrator: Option<Arc<dyn NarrationProvider>>,
    speech: Option<Arc<dyn SpeechProvider>>,
    muxer: Option<Arc<dyn VideoMuxer>>,
    progress: Option<ProgressCallback>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn SlideRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn narration_provider(mut self, provider: Arc<dyn NarrationProvider>) -> Self {
        self.narrator = Some(provider);
        self
    }

    pub fn speech_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        self.speech = Some(provider);
        self
    }

    pub fn muxer(mut self, muxer: Arc<dyn VideoMuxer>) -> Self {
        self.muxer = Some(muxer);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn build(self) -> Pipeline {
        let config = self.config.unwrap_or_default();
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(PdfiumRenderer::from_config(&config)));
        let muxer = self.muxer.unwrap_or_else(|| {
            Arc::new(FfmpegMuxer::new(
                config.ffmpeg_path.clone(),
                config.mux_timeout(),
            ))
        });
        Pipeline {
            input: self.input,
            output_dir: self.output_dir,
            renderer,
            narrator: self.narrator.map(OnceCell::with_value).unwrap_or_default(),
            speech: self.speech.map(OnceCell::with_value).unwrap_or_default(),
            muxer,
            progress: self
                .progress
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_respects_polish_flag() {
        assert_eq!(
            all_steps(false),
            vec![Stage::Images, Stage::Transcripts, Stage::Audio, Stage::Video]
        );
        assert!(all_steps(true).contains(&Stage::Polish));
    }

    #[test]
    fn step_lists_are_ordered_and_deduplicated() {
        assert_eq!(
            parse_steps("video,images,video", false).unwrap(),
            vec![Stage::Images, Stage::Video]
        );
        assert_eq!(parse_steps("ALL", true).unwrap().len(), 5);
        assert!(parse_steps("images,mux", false).is_err());
        assert!(parse_steps(" , ", false).is_err());
    }
}
