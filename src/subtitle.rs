//! SRT cue timing and rendering.
//!
//! Cue times come only from measured audio durations. Slide `i` spans
//! `[d1 + … + d(i-1), d1 + … + di]`; a long transcript is split at word
//! boundaries into sub-cues whose lengths are proportional to their
//! character counts, the last one ending exactly on the slide boundary.
//! All arithmetic is done in integer nanoseconds so boundaries never drift.

use std::fmt;
use std::time::Duration;

/// One numbered SRT cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    /// 1-based sequence number in the file.
    pub index: usize,
    /// Slide the text belongs to.
    pub slide: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl fmt::Display for SubtitleCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(
            f,
            "{} --> {}",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

/// Per-slide input to [`build_cues`].
#[derive(Debug, Clone)]
pub struct SlideText {
    pub slide: usize,
    pub duration: Duration,
    pub text: String,
}

/// Build cues for slides given in playback order.
///
/// Slides with blank text still advance the clock but emit no cue.
pub fn build_cues(slides: &[SlideText], max_chars_per_cue: usize) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut offset: u128 = 0;

    for s in slides {
        let slide_start = offset;
        let span = s.duration.as_nanos();
        offset += span;

        let chunks = split_text(&s.text, max_chars_per_cue);
        if chunks.is_empty() {
            continue;
        }
        let total_chars: u128 = chunks.iter().map(|c| c.chars().count() as u128).sum();

        let mut consumed: u128 = 0;
        let mut chunk_start = slide_start;
        for chunk in chunks {
            consumed += chunk.chars().count() as u128;
            let chunk_end = slide_start + span * consumed / total_chars;
            cues.push(SubtitleCue {
                index: cues.len() + 1,
                slide: s.slide,
                start: nanos_to_duration(chunk_start),
                end: nanos_to_duration(chunk_end),
                text: chunk,
            });
            chunk_start = chunk_end;
        }
    }
    cues
}

/// Render cues as an SRT document.
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    cues.iter().map(|c| c.to_string()).collect()
}

/// `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn format_timestamp(t: Duration) -> String {
    let ms = (t.as_nanos() + 500_000) / 1_000_000;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Split `text` into chunks of at most `max_chars` characters at word
/// boundaries. A single word longer than `max_chars` becomes its own chunk.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

fn nanos_to_duration(nanos: u128) -> Duration {
    let secs = (nanos / 1_000_000_000) as u64;
    let sub = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, sub)
}
