//! CLI binary for edgequake-pdf2video.
//!
//! A thin shim over the library crate: layers config file, environment and
//! flags into a `PipelineConfig`, runs the requested steps and prints the
//! per-stage report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2video::{
    parse_steps, FileConfig, Pipeline, PipelineConfig, PipelineConfigBuilder,
    PipelineProgressCallback, ProgressCallback, RunReport, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar, re-armed at the start of every stage. Slides may finish
/// out of order within a stage.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, slide: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&slide)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, pending: usize, total: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} slides  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(pending as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("{stage:<11}"));
        self.bar.reset_eta();
        let skipped = total - pending.min(total);
        self.bar.println(format!(
            "{} {}{}",
            cyan("◆"),
            bold(&format!("{stage}: {pending} of {total} slides to process")),
            if skipped > 0 {
                dim(&format!("  ({skipped} already done)"))
            } else {
                String::new()
            }
        ));
    }

    fn on_slide_start(&self, _stage: Stage, slide: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slide, Instant::now());
        self.bar.set_message(format!("slide {slide}"));
    }

    fn on_slide_complete(&self, _stage: Stage, slide: usize, total: usize) {
        let secs = self.elapsed_secs(slide);
        self.bar.println(format!(
            "  {} Slide {:>3}/{:<3}  {}",
            green("✓"),
            slide,
            total,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_slide_error(&self, _stage: Stage, slide: usize, error: &str) {
        let secs = self.elapsed_secs(slide);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Slide {:>3}  {}  {}",
            red("✗"),
            slide,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        if failed > 0 {
            self.bar.println(format!(
                "{} {stage}: {succeeded} done, {} failed",
                red("✘"),
                red(&failed.to_string())
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full run: images, narration, speech, video
  pdf2video deck.pdf -o out/

  # Include the polishing pass
  pdf2video deck.pdf -o out/ --polish

  # Re-run a single step (completed slides are skipped)
  pdf2video deck.pdf -o out/ --step transcripts

  # Several steps at once, in pipeline order
  pdf2video deck.pdf -o out/ --step audio,video

  # OpenAI for narration and speech
  pdf2video deck.pdf -p openai --tts-provider openai --voice nova

STEPS:
  images        rasterise every slide to out/images/slide_NN.png
  transcripts   narrate each slide image  → out/transcripts/
  polish        rewrite transcripts with neighbouring context → out/polished_transcripts/
  audio         text-to-speech per slide  → out/audio/
  video         final_video.mp4 + final_video.srt
  all           every step above (polish only with --polish)

RESUMING:
  A slide is done for a step when its output file exists and is non-empty.
  After a failure, run the same command again: only missing slides are
  processed. Delete a file to force that slide to be regenerated.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY           Gemini key (narration, provider gemini)
  OPENAI_API_KEY           OpenAI key (narration and/or TTS)
  GOOGLE_TTS_API_KEY       Google Cloud Text-to-Speech API key
  GOOGLE_TTS_ACCESS_TOKEN  OAuth bearer token, alternative to the API key
  PDFIUM_LIB_PATH          Path to libpdfium if not installed system-wide
  RUST_LOG                 tracing filter, e.g. edgequake_pdf2video=debug

CONFIG FILE:
  --config pdf2video.toml accepts every setting as a TOML key
  (speaking_rate = 1.1, voice_name = "en-US-Neural2-D", ...).
  Flags and environment variables override the file.
"#;

/// Turn a PDF slide deck into a narrated video.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2video",
    version,
    about = "Turn PDF slide decks into narrated videos using Vision LLMs and TTS",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF slide deck.
    input: PathBuf,

    /// Output directory for every intermediate file and the final video.
    #[arg(short, long, env = "PDF2VIDEO_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Step(s) to run: all, images, transcripts, polish, audio, video.
    /// Comma-separated lists are run in pipeline order.
    #[arg(long, env = "PDF2VIDEO_STEP", default_value = "all")]
    step: String,

    /// TOML config file. Flags and environment variables take precedence.
    #[arg(long, env = "PDF2VIDEO_CONFIG")]
    config: Option<PathBuf>,

    /// LLM provider for narration and polishing: gemini, openai.
    #[arg(short, long, env = "PDF2VIDEO_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID. Default: gemini-2.0-flash / gpt-4o-mini.
    #[arg(long, env = "PDF2VIDEO_MODEL")]
    model: Option<String>,

    /// Text-to-speech provider: google, openai.
    #[arg(long, env = "PDF2VIDEO_TTS_PROVIDER")]
    tts_provider: Option<String>,

    /// OpenAI speech model.
    #[arg(long, env = "PDF2VIDEO_TTS_MODEL")]
    tts_model: Option<String>,

    /// BCP-47 language of the narration voice.
    #[arg(long, env = "TTS_LANGUAGE_CODE")]
    language_code: Option<String>,

    /// Voice name, e.g. en-US-Neural2-D, en-US-Chirp3-HD-Charon, nova.
    #[arg(long, env = "TTS_VOICE_NAME")]
    voice: Option<String>,

    /// Voice gender used when no voice name is set: neutral, male, female.
    #[arg(long, env = "TTS_VOICE_GENDER")]
    voice_gender: Option<String>,

    /// Speaking rate (0.25–4.0).
    #[arg(long, env = "TTS_SPEAKING_RATE")]
    speaking_rate: Option<f64>,

    /// Audio container: wav, mp3.
    #[arg(long, env = "AUDIO_FORMAT")]
    audio_format: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "IMAGE_DPI")]
    dpi: Option<u32>,

    /// x264 CRF (0–51, lower is better).
    #[arg(long, env = "VIDEO_QUALITY")]
    video_quality: Option<u8>,

    /// x264 preset (ultrafast … veryslow).
    #[arg(long, env = "VIDEO_PRESET")]
    video_preset: Option<String>,

    /// Multiplier applied to the first slide's dimensions.
    #[arg(long, env = "VIDEO_RESOLUTION_SCALE")]
    resolution_scale: Option<f64>,

    /// Output frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Embed the SRT in the MP4 as a subtitle track.
    #[arg(long)]
    embed_subtitles: bool,

    /// Longest subtitle cue in characters.
    #[arg(long, env = "SUBTITLE_MAX_CHARS")]
    max_chars_per_cue: Option<usize>,

    /// Narration prompt template ({slide_number}, {total_slides}).
    #[arg(long, env = "VOICEOVER_PROMPT")]
    narration_prompt: Option<String>,

    /// Include the polish step in an `all` run.
    #[arg(long, env = "POLISH_TRANSCRIPTS")]
    polish: bool,

    /// Maximum slides processed concurrently per step.
    #[arg(short, long, env = "PDF2VIDEO_CONCURRENCY", visible_alias = "threads")]
    concurrency: Option<usize>,

    /// Per-call LLM/TTS timeout in seconds.
    #[arg(long, env = "PDF2VIDEO_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long, env = "FFMPEG_PATH")]
    ffmpeg: Option<PathBuf>,

    /// ffprobe executable.
    #[arg(long, env = "FFPROBE_PATH")]
    ffprobe: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDF2VIDEO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the feedback; library INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Config file ──────────────────────────────────────────────────────
    let mut file = match cli.config {
        Some(ref path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => FileConfig::default(),
    };
    // Credentials in the environment outrank the config file.
    for (var, key) in [
        ("GEMINI_API_KEY", &mut file.gemini_api_key),
        ("OPENAI_API_KEY", &mut file.openai_api_key),
        ("GOOGLE_TTS_API_KEY", &mut file.google_tts_api_key),
        ("GOOGLE_TTS_ACCESS_TOKEN", &mut file.google_tts_access_token),
    ] {
        if std::env::var_os(var).is_some_and(|v| !v.is_empty()) {
            *key = None;
        }
    }

    let config = build_config(&cli, &file)?;
    let steps = parse_steps(&cli.step, config.polish_enabled).context("Invalid --step")?;

    let progress = show_progress.then(CliProgressCallback::new);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    let concurrency = config.concurrency;
    let mut builder = Pipeline::builder(&cli.input, &cli.output).config(config);
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let pipeline = builder.build();

    let started = Instant::now();
    let (report, result) = runtime.block_on(pipeline.execute(&steps, concurrency));
    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }
    if let Err(e) = result {
        // Stages finished before the error are still reported.
        if !cli.quiet {
            print_stages(&report);
        }
        return Err(e).context("Pipeline failed");
    }
    if !cli.quiet {
        print_summary(&report, &cli.output, started.elapsed());
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Layer flags (and their environment variables) over the config file.
fn build_config(cli: &Cli, file: &FileConfig) -> Result<PipelineConfig> {
    let mut b: PipelineConfigBuilder = PipelineConfig::builder()
        .apply_file(file)
        .context("Invalid config file")?;

    if let Some(ref v) = cli.provider {
        b = b.provider(v.parse()?);
    }
    if let Some(ref v) = cli.model {
        b = b.model(v.clone());
    }
    if let Some(ref v) = cli.tts_provider {
        b = b.tts_provider(v.parse()?);
    }
    if let Some(ref v) = cli.tts_model {
        b = b.tts_model(v.clone());
    }
    if let Some(ref v) = cli.language_code {
        b = b.language_code(v.clone());
    }
    if let Some(ref v) = cli.voice {
        b = b.voice_name(v.clone());
    }
    if let Some(ref v) = cli.voice_gender {
        b = b.voice_gender(v.parse()?);
    }
    if let Some(v) = cli.speaking_rate {
        b = b.speaking_rate(v);
    }
    if let Some(ref v) = cli.audio_format {
        b = b.audio_format(v.parse()?);
    }
    if let Some(v) = cli.dpi {
        b = b.dpi(v);
    }
    if let Some(v) = cli.video_quality {
        b = b.video_quality(v);
    }
    if let Some(ref v) = cli.video_preset {
        b = b.video_preset(v.clone());
    }
    if let Some(v) = cli.resolution_scale {
        b = b.resolution_scale(v);
    }
    if let Some(v) = cli.fps {
        b = b.fps(v);
    }
    if cli.embed_subtitles {
        b = b.embed_subtitles(true);
    }
    if let Some(v) = cli.max_chars_per_cue {
        b = b.max_chars_per_cue(v);
    }
    if let Some(ref v) = cli.narration_prompt {
        b = b.narration_prompt(v.clone());
    }
    if cli.polish {
        b = b.polish_enabled(true);
    }
    if let Some(v) = cli.concurrency {
        b = b.concurrency(v);
    }
    if let Some(v) = cli.api_timeout {
        b = b.api_timeout_secs(v);
    }
    if let Some(ref v) = cli.pdfium_lib {
        b = b.pdfium_lib_path(v.clone());
    }
    if let Some(ref v) = cli.ffmpeg {
        b = b.ffmpeg_path(v.clone());
    }
    if let Some(ref v) = cli.ffprobe {
        b = b.ffprobe_path(v.clone());
    }

    b.build().context("Invalid configuration")
}

fn print_stages(report: &RunReport) {
    for stage in &report.stages {
        let mark = if stage.is_success() {
            green("✔")
        } else {
            red("✘")
        };
        eprintln!("{mark} {stage}");
        for failure in &stage.failed {
            eprintln!("    {} slide {}: {}", red("✗"), failure.slide, failure.error);
        }
    }
}

fn print_summary(report: &RunReport, output: &std::path::Path, elapsed: Duration) {
    print_stages(report);
    match report.halted_at {
        Some(stage) => eprintln!(
            "{} halted after '{}'; re-run the same command to retry failed slides",
            red("✘"),
            stage
        ),
        None => eprintln!(
            "{}  {}  {:.1}s  {} tokens in / {} out",
            green("✔"),
            bold(&output.display().to_string()),
            elapsed.as_secs_f64(),
            dim(&report.total_input_tokens().to_string()),
            dim(&report.total_output_tokens().to_string()),
        ),
    }
}
