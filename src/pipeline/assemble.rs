//! Video assembly: per-slide image + audio → one MP4 plus an SRT file.
//!
//! Every slide becomes a still-image segment exactly as long as its measured
//! audio. Slides follow each other in order, so slide `i` starts at the sum
//! of the previous durations, which is also where its subtitle cues start.
//!
//! Both outputs are written to `*.tmp` siblings and renamed into place only
//! after the muxer succeeded; a failed assembly leaves the previous video
//! (if any) untouched.

use crate::config::VideoSettings;
use crate::error::Pdf2VideoError;
use crate::layout::{is_complete, temp_path, OutputLayout};
use crate::pipeline::media::{audio_file_duration, run_tool, scaled_canvas};
use crate::subtitle::{build_cues, render_srt, SlideText};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// One still-image segment of the final video.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub slide: usize,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub duration: Duration,
}

/// Everything a muxer needs to produce the final video.
#[derive(Debug, Clone)]
pub struct MuxJob {
    /// Segments in playback order.
    pub segments: Vec<Segment>,
    /// Output `(width, height)`, both even.
    pub canvas: (u32, u32),
    pub settings: VideoSettings,
    /// SRT to embed as a `mov_text` track, when requested.
    pub subtitles: Option<PathBuf>,
    /// Where to write the MP4.
    pub output: PathBuf,
}

impl MuxJob {
    pub fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }
}

/// Produces an MP4 from a [`MuxJob`].
#[async_trait]
pub trait VideoMuxer: Send + Sync {
    async fn mux(&self, job: &MuxJob) -> Result<(), Pdf2VideoError>;
}

/// Muxer driving the `ffmpeg` executable.
///
/// The whole video comes out of one encode. Slides are read through a concat
/// demuxer script that carries each slide's exact duration, and the narration
/// files are joined into a single track by the `concat` filter. Every slide
/// therefore starts at an absolute timestamp; frame rounding never
/// accumulates from one slide to the next.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout,
        }
    }
}

#[async_trait]
impl VideoMuxer for FfmpegMuxer {
    async fn mux(&self, job: &MuxJob) -> Result<(), Pdf2VideoError> {
        if job.segments.is_empty() {
            return Err(Pdf2VideoError::MuxFailed {
                detail: "nothing to mux".into(),
            });
        }
        let work = tempfile::tempdir().map_err(|e| Pdf2VideoError::MuxFailed {
            detail: format!("cannot create scratch directory: {e}"),
        })?;

        let list = work.path().join("slides.ffconcat");
        tokio::fs::write(&list, image_list(&job.segments))
            .await
            .map_err(|e| Pdf2VideoError::MuxFailed {
                detail: format!("cannot write slide list: {e}"),
            })?;

        debug!(
            "ffmpeg: {} slides, {:?}, one pass",
            job.segments.len(),
            job.total_duration()
        );
        run_tool(&self.ffmpeg, mux_args(job, &list), self.timeout)
            .await
            .map_err(|e| Pdf2VideoError::MuxFailed {
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

/// `ffconcat` script showing each slide image for exactly its duration.
///
/// The last image is listed a second time without a duration; the demuxer
/// ignores the final entry's `duration` otherwise.
pub fn image_list(segments: &[Segment]) -> String {
    let mut out = String::from("ffconcat version 1.0\n");
    for seg in segments {
        out.push_str(&format!(
            "file {}\nduration {}\n",
            quote_path(&seg.image),
            format_seconds(seg.duration)
        ));
    }
    if let Some(last) = segments.last() {
        out.push_str(&format!("file {}\n", quote_path(&last.image)));
    }
    out
}

fn quote_path(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// `-filter_complex` graph for `audio_inputs` narration files.
///
/// Input 0 is the slide list; it is scaled to fit the canvas and padded with
/// black, so slides of a different size are letter-boxed instead of
/// stretched. Inputs `1..=audio_inputs` are resampled to a common format and
/// concatenated into `[a]`.
pub fn filter_graph(audio_inputs: usize, (w, h): (u32, u32), fps: u32) -> String {
    let mut graph = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps={fps},format=yuv420p[v];"
    );
    for i in 1..=audio_inputs {
        graph.push_str(&format!(
            "[{i}:a]aresample=48000,aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];"
        ));
    }
    for i in 1..=audio_inputs {
        graph.push_str(&format!("[a{i}]"));
    }
    graph.push_str(&format!("concat=n={audio_inputs}:v=0:a=1[a]"));
    graph
}

/// ffmpeg arguments producing the final MP4 from `list` in a single encode.
pub fn mux_args(job: &MuxJob, list: &Path) -> Vec<OsString> {
    let settings = &job.settings;
    let n = job.segments.len();
    let crf = settings.quality.to_string();
    let total = format_seconds(job.total_duration());

    let mut args: Vec<OsString> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(list.as_os_str().to_os_string());
    for seg in &job.segments {
        args.push("-i".into());
        args.push(seg.audio.clone().into_os_string());
    }
    if let Some(ref srt) = job.subtitles {
        args.push("-i".into());
        args.push(srt.clone().into_os_string());
    }

    args.push("-filter_complex".into());
    args.push(filter_graph(n, job.canvas, settings.fps).into());
    args.extend(["-map", "[v]", "-map", "[a]"].map(OsString::from));
    if job.subtitles.is_some() {
        args.push("-map".into());
        args.push(format!("{}:s", n + 1).into());
        args.extend(["-c:s", "mov_text"].map(OsString::from));
    }

    args.extend(
        [
            "-c:v",
            settings.video_codec.as_str(),
            "-preset",
            settings.preset.as_str(),
            "-crf",
            crf.as_str(),
        ]
        .map(OsString::from),
    );
    if settings.video_codec == "libx264" {
        args.extend(["-tune", "stillimage"].map(OsString::from));
    }
    args.extend(
        [
            "-c:a",
            settings.audio_codec.as_str(),
            "-t",
            total.as_str(),
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ]
        .map(OsString::from),
    );
    args.push(job.output.as_os_str().to_os_string());
    args
}

/// Seconds with microsecond precision, as ffmpeg time values accept.
fn format_seconds(d: Duration) -> String {
    format!("{}.{:06}", d.as_secs(), d.subsec_micros())
}

/// What [`VideoAssembler::assemble`] produced.
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub video: PathBuf,
    pub subtitles: PathBuf,
    pub duration: Duration,
    pub cue_count: usize,
}

/// Collects per-slide assets, writes subtitles and drives the muxer.
pub struct VideoAssembler {
    muxer: Arc<dyn VideoMuxer>,
    settings: VideoSettings,
    max_chars_per_cue: usize,
    ffprobe: PathBuf,
    probe_timeout: Duration,
}

impl VideoAssembler {
    pub fn new(
        muxer: Arc<dyn VideoMuxer>,
        settings: VideoSettings,
        max_chars_per_cue: usize,
        ffprobe: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            muxer,
            settings,
            max_chars_per_cue,
            ffprobe: ffprobe.into(),
            probe_timeout,
        }
    }

    /// Build `final_video.mp4` and `final_video.srt` for every slide.
    pub async fn assemble(&self, layout: &OutputLayout) -> Result<AssemblyOutput, Pdf2VideoError> {
        self.settings.validate()?;

        let mut segments = Vec::with_capacity(layout.slide_count());
        let mut texts = Vec::with_capacity(layout.slide_count());
        let mut first_dims = None;

        for slide in layout.slides() {
            let fail = |reason: String| Pdf2VideoError::AssemblyFailed { slide, reason };

            let image = layout.image_path(slide);
            if !is_complete(&image).await {
                return Err(fail(format!("image {} missing or empty", image.display())));
            }
            let dims = image::image_dimensions(&image)
                .map_err(|e| fail(format!("image {} unreadable: {e}", image.display())))?;
            first_dims.get_or_insert(dims);

            let audio = layout.audio_path(slide);
            if !is_complete(&audio).await {
                return Err(fail(format!("audio {} missing or empty", audio.display())));
            }
            let duration = audio_file_duration(
                &audio,
                layout.audio_format(),
                &self.ffprobe,
                self.probe_timeout,
            )
            .await
            .map_err(|e| fail(format!("cannot measure {}: {e}", audio.display())))?;
            if duration.is_zero() {
                return Err(fail(format!("audio {} has zero duration", audio.display())));
            }

            let text = layout
                .preferred_transcript(slide)
                .await
                .map_err(|e| fail(format!("transcript unreadable: {e}")))?;

            segments.push(Segment {
                slide,
                image,
                audio,
                duration,
            });
            texts.push(SlideText {
                slide,
                duration,
                text,
            });
        }

        let dims = first_dims.ok_or_else(|| Pdf2VideoError::AssemblyFailed {
            slide: 0,
            reason: "deck has no slides".into(),
        })?;
        let canvas = scaled_canvas(dims, self.settings.resolution_scale);

        let cues = build_cues(&texts, self.max_chars_per_cue);
        let srt = render_srt(&cues);

        let video = layout.video_path();
        let subtitles = layout.subtitle_path();
        let video_tmp = temp_path(&video);
        let srt_tmp = temp_path(&subtitles);

        tokio::fs::write(&srt_tmp, srt.as_bytes())
            .await
            .map_err(|e| Pdf2VideoError::write_failed(&srt_tmp, e))?;

        let job = MuxJob {
            segments,
            canvas,
            settings: self.settings.clone(),
            subtitles: self.settings.embed_subtitles.then(|| srt_tmp.clone()),
            output: video_tmp.clone(),
        };
        info!(
            "Muxing {} segments ({:?} total) at {}x{}",
            job.segments.len(),
            job.total_duration(),
            canvas.0,
            canvas.1
        );

        let muxed = match self.muxer.mux(&job).await {
            Ok(()) if is_complete(&video_tmp).await => Ok(()),
            Ok(()) => Err(Pdf2VideoError::MuxFailed {
                detail: "muxer reported success but wrote no video".into(),
            }),
            Err(e) => Err(e),
        };
        if let Err(e) = muxed {
            discard(&[&video_tmp, &srt_tmp]).await;
            return Err(e);
        }

        // Video last: its presence marks the stage complete.
        tokio::fs::rename(&srt_tmp, &subtitles)
            .await
            .map_err(|e| Pdf2VideoError::write_failed(&subtitles, e))?;
        tokio::fs::rename(&video_tmp, &video)
            .await
            .map_err(|e| Pdf2VideoError::write_failed(&video, e))?;

        Ok(AssemblyOutput {
            video,
            subtitles,
            duration: job.total_duration(),
            cue_count: cues.len(),
        })
    }
}

async fn discard(paths: &[&Path]) {
    for p in paths {
        if let Err(e) = tokio::fs::remove_file(p).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot remove {}: {e}", p.display());
            }
        }
    }
}

/// `true` iff both outputs exist and no per-slide input is newer than the
/// video.
pub async fn video_is_current(layout: &OutputLayout) -> bool {
    let video = layout.video_path();
    if !is_complete(&video).await || !is_complete(&layout.subtitle_path()).await {
        return false;
    }
    let Some(built) = modified(&video).await else {
        return false;
    };
    for slide in layout.slides() {
        for input in [
            layout.image_path(slide),
            layout.transcript_path(slide),
            layout.polished_path(slide),
            layout.audio_path(slide),
        ] {
            if matches!(modified(&input).await, Some(t) if t > built) {
                return false;
            }
        }
    }
    true
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}
