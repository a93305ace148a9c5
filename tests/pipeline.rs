//! Orchestrator integration tests with in-process fakes.
//!
//! No pdfium, network or ffmpeg is involved: the renderer fabricates PNGs,
//! the narration provider echoes the slide number, the TTS provider returns
//! WAVs whose length depends on the text, and the muxer writes a stub file
//! while recording what it was asked to do.

use async_trait::async_trait;
use edgequake_pdf2video::pipeline::encode::png_bytes;
use edgequake_pdf2video::prompts::{NO_NEXT_SLIDE, NO_PREVIOUS_SLIDE};
use edgequake_pdf2video::{
    all_steps, Completion, MuxJob, NarrationProvider, OutputLayout, Pdf2VideoError, Pipeline,
    PipelineConfig, PipelineProgressCallback, ProviderError, SlideRenderer, SpeechProvider, Stage,
    VideoMuxer, VoiceConfig,
};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeRenderer {
    pages: usize,
    rendered: Mutex<Vec<usize>>,
}

#[async_trait]
impl SlideRenderer for FakeRenderer {
    async fn page_count(&self, _pdf: &Path) -> Result<usize, Pdf2VideoError> {
        Ok(self.pages)
    }

    async fn render(
        &self,
        _pdf: &Path,
        slides: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, Pdf2VideoError> {
        self.rendered.lock().unwrap().extend_from_slice(slides);
        Ok(slides
            .iter()
            .map(|&s| {
                let img = image::DynamicImage::new_rgb8(160, 90);
                (s, png_bytes(&img).unwrap())
            })
            .collect())
    }
}

#[derive(Default)]
struct FakeNarrator {
    fail_on: Option<usize>,
    narrated: Mutex<Vec<usize>>,
    polish_prompts: Mutex<Vec<String>>,
}

impl FakeNarrator {
    fn failing_on(slide: usize) -> Self {
        Self {
            fail_on: Some(slide),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.narrated.lock().unwrap().len() + self.polish_prompts.lock().unwrap().len()
    }
}

/// The slide number in "This is slide N of M".
fn slide_in_prompt(prompt: &str) -> usize {
    let marker = "This is slide ";
    let rest = &prompt[prompt.find(marker).unwrap() + marker.len()..];
    rest.split_whitespace().next().unwrap().parse().unwrap()
}

#[async_trait]
impl NarrationProvider for FakeNarrator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn describe_image(&self, png: &[u8], prompt: &str) -> Result<Completion, ProviderError> {
        assert!(png.starts_with(b"\x89PNG"));
        let slide = slide_in_prompt(prompt);
        self.narrated.lock().unwrap().push(slide);
        if self.fail_on == Some(slide) {
            return Err(ProviderError::Api {
                provider: "fake".into(),
                message: "HTTP 429 quota exceeded".into(),
            });
        }
        Ok(Completion {
            text: format!("Narration for slide {slide}."),
            input_tokens: 100,
            output_tokens: 10,
        })
    }

    async fn complete_text(&self, prompt: &str) -> Result<Completion, ProviderError> {
        self.polish_prompts.lock().unwrap().push(prompt.to_string());
        Ok(Completion::text("Polished narration."))
    }
}

#[derive(Default)]
struct FakeTts {
    texts: Mutex<Vec<String>>,
}

impl FakeTts {
    fn calls(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

/// 8 kHz mono WAV lasting `ms` milliseconds.
fn wav(ms: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..ms * 8 {
            w.write_sample(0i16).unwrap();
        }
        w.finalize().unwrap();
    }
    cursor.into_inner()
}

#[async_trait]
impl SpeechProvider for FakeTts {
    fn name(&self) -> &str {
        "fake-tts"
    }

    async fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>, ProviderError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(wav(500 + 25 * text.len() as u32))
    }
}

#[derive(Default)]
struct FakeMuxer {
    jobs: Mutex<Vec<MuxJob>>,
}

impl FakeMuxer {
    fn calls(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoMuxer for FakeMuxer {
    async fn mux(&self, job: &MuxJob) -> Result<(), Pdf2VideoError> {
        tokio::fs::write(&job.output, format!("{:?}", job.total_duration()))
            .await
            .unwrap();
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    pdf: PathBuf,
    out: PathBuf,
    pages: usize,
    renderer: Arc<FakeRenderer>,
    narrator: Arc<FakeNarrator>,
    tts: Arc<FakeTts>,
    muxer: Arc<FakeMuxer>,
}

impl Harness {
    fn new(pages: usize) -> Self {
        Self::with_narrator(pages, FakeNarrator::default())
    }

    fn with_narrator(pages: usize, narrator: FakeNarrator) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("deck.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n% test deck\n").unwrap();
        let out = dir.path().join("out");
        Self {
            pdf,
            out,
            pages,
            renderer: Arc::new(FakeRenderer {
                pages,
                rendered: Mutex::new(Vec::new()),
            }),
            narrator: Arc::new(narrator),
            tts: Arc::new(FakeTts::default()),
            muxer: Arc::new(FakeMuxer::default()),
            _dir: dir,
        }
    }

    fn pipeline(&self, config: PipelineConfig) -> Pipeline {
        Pipeline::builder(&self.pdf, &self.out)
            .config(config)
            .renderer(self.renderer.clone())
            .narration_provider(self.narrator.clone())
            .speech_provider(self.tts.clone())
            .muxer(self.muxer.clone())
            .build()
    }

    async fn run(&self, steps: &[Stage]) -> Result<edgequake_pdf2video::RunReport, Pdf2VideoError> {
        self.pipeline(PipelineConfig::default()).run(steps, 4).await
    }

    fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.out, self.pages, Default::default())
    }

    /// Every file under the output directory with its bytes.
    fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        fn walk(dir: &Path, acc: &mut BTreeMap<PathBuf, Vec<u8>>) {
            for entry in std::fs::read_dir(dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    walk(&path, acc);
                } else {
                    acc.insert(path.clone(), std::fs::read(&path).unwrap());
                }
            }
        }
        let mut acc = BTreeMap::new();
        walk(&self.out, &mut acc);
        acc
    }
}

fn wav_length(path: &Path) -> Duration {
    let reader = hound::WavReader::open(path).unwrap();
    let spec = reader.spec();
    Duration::from_nanos(reader.duration() as u64 * 1_000_000_000 / spec.sample_rate as u64)
}

/// `(start, end)` of every cue in an SRT document, in milliseconds.
fn cue_spans(srt: &str) -> Vec<(u64, u64)> {
    fn ms(ts: &str) -> u64 {
        let (hms, millis) = ts.trim().split_once(',').unwrap();
        let parts: Vec<u64> = hms.split(':').map(|p| p.parse().unwrap()).collect();
        ((parts[0] * 60 + parts[1]) * 60 + parts[2]) * 1_000 + millis.parse::<u64>().unwrap()
    }
    srt.lines()
        .filter_map(|l| l.split_once(" --> "))
        .map(|(a, b)| (ms(a), ms(b)))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_slide_deck_end_to_end() {
    let h = Harness::new(3);
    let report = h.run(&all_steps(false)).await.unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.stages.len(), 4);
    assert!(report.stage(Stage::Polish).is_none());

    let layout = h.layout();
    for slide in 1..=3 {
        assert!(layout.image_path(slide).exists());
        assert!(layout.transcript_path(slide).exists());
        assert!(layout.audio_path(slide).exists());
        assert!(!layout.polished_path(slide).exists());
    }

    let durations: Vec<Duration> = (1..=3).map(|s| wav_length(&layout.audio_path(s))).collect();
    let total: Duration = durations.iter().sum();

    let jobs = h.muxer.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].total_duration(), total);
    assert_eq!(jobs[0].canvas, (160, 90));

    let srt = std::fs::read_to_string(layout.subtitle_path()).unwrap();
    let spans = cue_spans(&srt);
    assert_eq!(spans.len(), 3);
    assert_eq!(spans[0].0, 0);
    for pair in spans.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "cues must not leave gaps");
    }
    assert_eq!(spans[2].1, total.as_millis() as u64);
    assert!(srt.contains("Narration for slide 2."));

    let narration = report.stage(Stage::Transcripts).unwrap();
    assert_eq!(narration.input_tokens, 300);
    assert_eq!(narration.output_tokens, 30);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let h = Harness::new(3);
    h.run(&all_steps(false)).await.unwrap();
    let before = h.snapshot();
    let (narrations, speeches) = (h.narrator.calls(), h.tts.calls());

    let report = h.run(&all_steps(false)).await.unwrap();
    assert!(report.is_success());
    assert_eq!(h.narrator.calls(), narrations);
    assert_eq!(h.tts.calls(), speeches);
    assert_eq!(h.muxer.calls(), 1);
    assert_eq!(h.renderer.rendered.lock().unwrap().len(), 3);
    for stage in &report.stages {
        assert_eq!(stage.skipped, 3, "{stage}");
        assert_eq!(stage.succeeded, 0, "{stage}");
    }
    assert_eq!(h.snapshot(), before);
}

#[tokio::test]
async fn deleted_transcript_is_the_only_one_regenerated() {
    let h = Harness::new(4);
    h.run(&[Stage::Images, Stage::Transcripts]).await.unwrap();
    std::fs::remove_file(h.layout().transcript_path(3)).unwrap();
    h.narrator.narrated.lock().unwrap().clear();

    let report = h.run(&[Stage::Transcripts]).await.unwrap();
    assert_eq!(*h.narrator.narrated.lock().unwrap(), vec![3]);
    let stage = report.stage(Stage::Transcripts).unwrap();
    assert_eq!((stage.skipped, stage.succeeded), (3, 1));
}

#[tokio::test]
async fn one_failing_slide_halts_after_its_stage() {
    let h = Harness::with_narrator(5, FakeNarrator::failing_on(2));
    let report = h.run(&all_steps(false)).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.halted_at, Some(Stage::Transcripts));
    let stage = report.stage(Stage::Transcripts).unwrap();
    assert_eq!(stage.failed_slides(), vec![2]);
    assert!(stage.failed[0].error.contains("429"));
    assert_eq!(stage.succeeded, 4);
    assert!(report.stage(Stage::Audio).is_none());

    let layout = h.layout();
    for slide in [1, 3, 4, 5] {
        assert!(layout.transcript_path(slide).exists(), "slide {slide}");
    }
    assert!(!layout.transcript_path(2).exists());
    assert_eq!(h.tts.calls(), 0);
    assert_eq!(h.muxer.calls(), 0);
}

#[tokio::test]
async fn rerun_after_failure_retries_only_the_failed_slide() {
    let h = Harness::with_narrator(3, FakeNarrator::failing_on(2));
    h.run(&[Stage::Images, Stage::Transcripts]).await.unwrap();

    let healthy = Harness {
        narrator: Arc::new(FakeNarrator::default()),
        ..h
    };
    let report = healthy.run(&[Stage::Transcripts]).await.unwrap();
    assert!(report.is_success());
    assert_eq!(*healthy.narrator.narrated.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn invalid_speaking_rate_makes_no_tts_call() {
    let h = Harness::new(2);
    h.run(&[Stage::Images, Stage::Transcripts]).await.unwrap();

    let config = PipelineConfig {
        voice: VoiceConfig {
            speaking_rate: 5.0,
            ..VoiceConfig::default()
        },
        ..PipelineConfig::default()
    };
    let err = h
        .pipeline(config)
        .run(&[Stage::Audio], 4)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2VideoError::ConfigInvalid(_)), "{err}");
    assert_eq!(h.tts.calls(), 0);
    assert!(!h.layout().audio_path(1).exists());
}

#[tokio::test]
async fn polish_uses_placeholders_at_the_edges() {
    let h = Harness::new(3);
    let config = PipelineConfig {
        polish_enabled: true,
        ..PipelineConfig::default()
    };
    let report = h.pipeline(config).run(&all_steps(true), 2).await.unwrap();
    assert!(report.is_success(), "{report:?}");

    let prompts = h.narrator.polish_prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 3);
    let prompt_for = |slide: usize| {
        let marker = format!("(rewrite this one):\n\"\"\"Narration for slide {slide}.\"\"\"");
        prompts
            .iter()
            .find(|p| p.contains(&marker))
            .unwrap_or_else(|| panic!("no polish prompt for slide {slide}"))
            .clone()
    };

    let first = prompt_for(1);
    assert!(first.contains(NO_PREVIOUS_SLIDE));
    assert!(first.contains("Narration for slide 2."));
    assert!(!first.contains(NO_NEXT_SLIDE));

    let last = prompt_for(3);
    assert!(last.contains(NO_NEXT_SLIDE));
    assert!(last.contains("Narration for slide 2."));
    assert!(!last.contains(NO_PREVIOUS_SLIDE));

    let layout = h.layout();
    for slide in 1..=3 {
        let raw = std::fs::read_to_string(layout.transcript_path(slide)).unwrap();
        assert_eq!(raw, format!("Narration for slide {slide}."));
        let polished = std::fs::read_to_string(layout.polished_path(slide)).unwrap();
        assert_eq!(polished, "Polished narration.");
    }
    assert!(h
        .tts
        .texts
        .lock()
        .unwrap()
        .iter()
        .all(|t| t == "Polished narration."));
}

#[tokio::test]
async fn empty_and_temp_files_count_as_missing() {
    let h = Harness::new(3);
    h.run(&[Stage::Images, Stage::Transcripts]).await.unwrap();
    let layout = h.layout();

    std::fs::write(layout.transcript_path(1), b"").unwrap();
    let two = layout.transcript_path(2);
    let mut tmp = two.clone().into_os_string();
    tmp.push(".tmp");
    std::fs::rename(&two, &tmp).unwrap();
    h.narrator.narrated.lock().unwrap().clear();

    h.run(&[Stage::Transcripts]).await.unwrap();
    let mut redone = h.narrator.narrated.lock().unwrap().clone();
    redone.sort();
    assert_eq!(redone, vec![1, 2]);
    assert!(std::fs::metadata(layout.transcript_path(1)).unwrap().len() > 0);
}

#[tokio::test]
async fn missing_prerequisite_names_the_first_missing_stage() {
    let h = Harness::new(3);

    let err = h.run(&[Stage::Audio]).await.unwrap_err();
    match err {
        Pdf2VideoError::MissingPrerequisite {
            step,
            missing,
            slides,
        } => {
            assert_eq!(step, Stage::Audio);
            assert_eq!(missing, Stage::Transcripts);
            assert_eq!(slides, vec![1, 2, 3]);
        }
        other => panic!("unexpected error: {other}"),
    }

    h.run(&[Stage::Images]).await.unwrap();
    std::fs::remove_file(h.layout().image_path(2)).unwrap();
    let err = h.run(&[Stage::Video]).await.unwrap_err();
    assert!(matches!(
        err,
        Pdf2VideoError::MissingPrerequisite {
            missing: Stage::Images,
            ..
        }
    ));
    assert_eq!(h.muxer.calls(), 0);
}

#[tokio::test]
async fn fatal_error_keeps_finished_stage_reports() {
    let h = Harness::new(2);
    let (report, result) = h
        .pipeline(PipelineConfig::default())
        .execute(&[Stage::Images, Stage::Audio], 2)
        .await;

    assert!(matches!(
        result,
        Err(Pdf2VideoError::MissingPrerequisite {
            step: Stage::Audio,
            missing: Stage::Transcripts,
            ..
        })
    ));
    let stages: Vec<Stage> = report.stages.iter().filter_map(|s| s.stage).collect();
    assert_eq!(stages, vec![Stage::Images]);
    assert_eq!(report.stage(Stage::Images).unwrap().succeeded, 2);
    assert_eq!(h.tts.calls(), 0);
}

#[tokio::test]
async fn steps_run_in_pipeline_order() {
    let h = Harness::new(2);
    let report = h
        .run(&[Stage::Video, Stage::Audio, Stage::Images, Stage::Transcripts, Stage::Images])
        .await
        .unwrap();
    let order: Vec<Stage> = report.stages.iter().filter_map(|s| s.stage).collect();
    assert_eq!(
        order,
        vec![Stage::Images, Stage::Transcripts, Stage::Audio, Stage::Video]
    );
}

#[tokio::test]
async fn not_a_pdf_is_rejected_before_any_work() {
    let h = Harness::new(2);
    std::fs::write(&h.pdf, b"<html>not a pdf</html>").unwrap();
    let err = h.run(&all_steps(false)).await.unwrap_err();
    assert!(matches!(err, Pdf2VideoError::NotAPdf { .. }));
    assert!(h.renderer.rendered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn progress_callback_sees_every_slide() {
    #[derive(Default)]
    struct Counting {
        stages: AtomicUsize,
        done: AtomicUsize,
        errors: AtomicUsize,
    }

    impl PipelineProgressCallback for Counting {
        fn on_stage_start(&self, _stage: Stage, _pending: usize, _total: usize) {
            self.stages.fetch_add(1, Ordering::SeqCst);
        }
        fn on_slide_complete(&self, _stage: Stage, _slide: usize, _total: usize) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        fn on_slide_error(&self, _stage: Stage, _slide: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    let h = Harness::with_narrator(3, FakeNarrator::failing_on(3));
    let counting = Arc::new(Counting::default());
    let pipeline = Pipeline::builder(&h.pdf, &h.out)
        .renderer(h.renderer.clone())
        .narration_provider(h.narrator.clone())
        .speech_provider(h.tts.clone())
        .muxer(h.muxer.clone())
        .progress_callback(counting.clone())
        .build();
    pipeline
        .run(&[Stage::Images, Stage::Transcripts], 2)
        .await
        .unwrap();

    assert_eq!(counting.stages.load(Ordering::SeqCst), 2);
    // 3 images + 2 transcripts
    assert_eq!(counting.done.load(Ordering::SeqCst), 5);
    assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
}
