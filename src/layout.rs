//! On-disk layout shared by every stage.
//!
//! The file naming convention is the only hand-off contract between stages:
//! a stage reads its inputs from, and writes its outputs to, fixed per-slide
//! paths under the output directory.
//!
//! ```text
//! <output>/images/slide_NN.png
//! <output>/transcripts/slide_NN.txt
//! <output>/polished_transcripts/slide_NN.txt
//! <output>/audio/slide_NN.{wav|mp3}
//! <output>/final_video.mp4
//! <output>/final_video.srt
//! ```
//!
//! A slide's output for a stage is *complete* iff the file exists and is
//! non-empty. Every write goes through [`write_atomic`] so an interrupted
//! process can leave at most a `*.tmp` sibling behind, never a truncated file
//! at the final path.

use crate::config::AudioFormat;
use crate::error::Pdf2VideoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;

pub const IMAGES_DIR: &str = "images";
pub const TRANSCRIPTS_DIR: &str = "transcripts";
pub const POLISHED_DIR: &str = "polished_transcripts";
pub const AUDIO_DIR: &str = "audio";
pub const VIDEO_FILE: &str = "final_video.mp4";
pub const SUBTITLE_FILE: &str = "final_video.srt";

/// One step of the pipeline, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Images,
    Transcripts,
    Polish,
    Audio,
    Video,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Images,
        Stage::Transcripts,
        Stage::Polish,
        Stage::Audio,
        Stage::Video,
    ];

    /// Stages whose outputs must be complete before this one can run.
    ///
    /// Polishing is optional, so nothing hard-depends on it: speech and
    /// subtitles fall back to the raw transcript per slide.
    pub fn prerequisites(self) -> &'static [Stage] {
        match self {
            Stage::Images => &[],
            Stage::Transcripts => &[Stage::Images],
            Stage::Polish => &[Stage::Transcripts],
            Stage::Audio => &[Stage::Transcripts],
            Stage::Video => &[Stage::Images, Stage::Transcripts, Stage::Audio],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Images => "images",
            Stage::Transcripts => "transcripts",
            Stage::Polish => "polish",
            Stage::Audio => "audio",
            Stage::Video => "video",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "images" => Ok(Stage::Images),
            "transcripts" => Ok(Stage::Transcripts),
            "polish" => Ok(Stage::Polish),
            "audio" => Ok(Stage::Audio),
            "video" => Ok(Stage::Video),
            other => Err(Pdf2VideoError::ConfigInvalid(format!(
                "unknown step '{other}' (expected images, transcripts, polish, audio or video)"
            ))),
        }
    }
}

/// Paths for every stage output of a deck with `slide_count` slides.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    slide_count: usize,
    width: usize,
    audio_format: AudioFormat,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, slide_count: usize, audio_format: AudioFormat) -> Self {
        Self {
            root: root.into(),
            slide_count,
            width: index_width(slide_count),
            audio_format,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    /// All slide indices, `1..=N`.
    pub fn slides(&self) -> impl Iterator<Item = usize> {
        1..=self.slide_count
    }

    pub fn audio_format(&self) -> AudioFormat {
        self.audio_format
    }

    /// `slide_NN.<ext>` with NN zero-padded to the layout width.
    pub fn file_name(&self, slide: usize, ext: &str) -> String {
        format!("slide_{:0width$}.{ext}", slide, width = self.width)
    }

    pub fn image_path(&self, slide: usize) -> PathBuf {
        self.root.join(IMAGES_DIR).join(self.file_name(slide, "png"))
    }

    pub fn transcript_path(&self, slide: usize) -> PathBuf {
        self.root
            .join(TRANSCRIPTS_DIR)
            .join(self.file_name(slide, "txt"))
    }

    pub fn polished_path(&self, slide: usize) -> PathBuf {
        self.root.join(POLISHED_DIR).join(self.file_name(slide, "txt"))
    }

    pub fn audio_path(&self, slide: usize) -> PathBuf {
        self.root
            .join(AUDIO_DIR)
            .join(self.file_name(slide, self.audio_format.extension()))
    }

    pub fn video_path(&self) -> PathBuf {
        self.root.join(VIDEO_FILE)
    }

    pub fn subtitle_path(&self) -> PathBuf {
        self.root.join(SUBTITLE_FILE)
    }

    /// The file whose presence marks `stage` complete for `slide`.
    ///
    /// The video stage has a single run-level output, so every slide maps to
    /// the same path.
    pub fn stage_output(&self, stage: Stage, slide: usize) -> PathBuf {
        match stage {
            Stage::Images => self.image_path(slide),
            Stage::Transcripts => self.transcript_path(slide),
            Stage::Polish => self.polished_path(slide),
            Stage::Audio => self.audio_path(slide),
            Stage::Video => self.video_path(),
        }
    }

    /// Slides whose output for `stage` is missing or empty, in index order.
    pub async fn incomplete_slides(&self, stage: Stage) -> Vec<usize> {
        let mut pending = Vec::new();
        for slide in self.slides() {
            if !is_complete(&self.stage_output(stage, slide)).await {
                pending.push(slide);
            }
        }
        pending
    }

    /// Slides whose complete audio is older than their polished transcript.
    ///
    /// Audio is never regenerated for this; callers only report it.
    pub async fn stale_audio_slides(&self) -> Vec<usize> {
        let mut stale = Vec::new();
        for slide in self.slides() {
            let audio = modified_if_complete(&self.audio_path(slide)).await;
            let polished = modified_if_complete(&self.polished_path(slide)).await;
            if let (Some(audio), Some(polished)) = (audio, polished) {
                if polished > audio {
                    stale.push(slide);
                }
            }
        }
        stale
    }

    /// Create every stage directory.
    pub async fn ensure_dirs(&self) -> Result<(), Pdf2VideoError> {
        for dir in [IMAGES_DIR, TRANSCRIPTS_DIR, POLISHED_DIR, AUDIO_DIR] {
            let path = self.root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| Pdf2VideoError::write_failed(&path, e))?;
        }
        Ok(())
    }

    /// Text to narrate or subtitle for `slide`: the polished transcript when
    /// present and non-empty, otherwise the raw one.
    pub async fn preferred_transcript(&self, slide: usize) -> std::io::Result<String> {
        let polished = self.polished_path(slide);
        if is_complete(&polished).await {
            let text = tokio::fs::read_to_string(&polished).await?;
            if !text.trim().is_empty() {
                return Ok(text.trim().to_string());
            }
        }
        let raw = tokio::fs::read_to_string(self.transcript_path(slide)).await?;
        Ok(raw.trim().to_string())
    }
}

/// Zero-padding width for `slide_count` slides: at least two digits.
pub fn index_width(slide_count: usize) -> usize {
    slide_count.max(1).to_string().len().max(2)
}

/// `true` iff `path` is a regular file with at least one byte.
pub async fn is_complete(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

async fn modified_if_complete(path: &Path) -> Option<SystemTime> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    if meta.is_file() && meta.len() > 0 {
        meta.modified().ok()
    } else {
        None
    }
}

/// Temp sibling used while `path` is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a temp file and an atomic rename.
///
/// The final path either keeps its previous state or holds the complete new
/// content; a crash mid-write leaves only the `.tmp` sibling.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await
}
