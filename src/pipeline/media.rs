//! Media inspection and external tool execution.
//!
//! Durations always come from the audio itself, never from text length:
//! WAV headers are read in-process with `hound`; anything else (MP3, or a WAV
//! whose header lies about its length, as streamed encoders emit) is measured
//! by `ffprobe`. Every subprocess runs under a timeout and is killed if it
//! overruns.

use crate::config::AudioFormat;
use std::ffi::OsStr;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Failure running ffmpeg or ffprobe.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("cannot start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from '{program}': {detail}")]
    BadOutput { program: String, detail: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `program args…`, returning stdout on success.
pub async fn run_tool<I, S>(program: &Path, args: I, timeout: Duration) -> Result<String, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let child = Command::new(program)
        .args(args)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::select! {
        result = child => result.map_err(|source| ToolError::Spawn {
            program: name.clone(),
            source,
        })?,
        _ = tokio::time::sleep(timeout) => {
            return Err(ToolError::TimedOut {
                program: name,
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr: tail_lines(&stderr, 12),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Last `n` non-empty lines of tool stderr; ffmpeg prints its banner first
/// and the actual error last.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Duration of an in-memory WAV, or `None` if the header is unusable.
///
/// A header whose declared sample count exceeds the bytes actually present
/// is rejected rather than trusted.
pub fn wav_duration(bytes: &[u8]) -> Option<Duration> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    let frames = reader.duration() as u128;
    let declared_bytes =
        frames * spec.channels as u128 * (spec.bits_per_sample as u128).div_ceil(8);
    if declared_bytes > bytes.len() as u128 {
        return None;
    }
    let nanos = frames * 1_000_000_000 / spec.sample_rate as u128;
    Some(Duration::from_nanos(nanos as u64))
}

/// Duration reported by `ffprobe` for a media file.
pub async fn probe_duration(
    path: &Path,
    ffprobe: &Path,
    timeout: Duration,
) -> Result<Duration, ToolError> {
    let args: [&OsStr; 7] = [
        OsStr::new("-v"),
        OsStr::new("error"),
        OsStr::new("-show_entries"),
        OsStr::new("format=duration"),
        OsStr::new("-of"),
        OsStr::new("default=noprint_wrappers=1:nokey=1"),
        path.as_os_str(),
    ];
    let stdout = run_tool(ffprobe, args, timeout).await?;
    parse_probe_seconds(&stdout).ok_or_else(|| ToolError::BadOutput {
        program: ffprobe.display().to_string(),
        detail: format!("no duration in {:?}", stdout.trim()),
    })
}

fn parse_probe_seconds(stdout: &str) -> Option<Duration> {
    let secs: f64 = stdout.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Duration of an audio file on disk: WAV header first, ffprobe otherwise.
pub async fn audio_file_duration(
    path: &Path,
    format: AudioFormat,
    ffprobe: &Path,
    timeout: Duration,
) -> Result<Duration, ToolError> {
    if format == AudioFormat::Wav {
        if let Ok(bytes) = tokio::fs::read(path).await {
            if let Some(d) = wav_duration(&bytes) {
                debug!("{}: {:?} from WAV header", path.display(), d);
                return Ok(d);
            }
        }
        warn!(
            "{}: WAV header unusable, falling back to ffprobe",
            path.display()
        );
    }
    probe_duration(path, ffprobe, timeout).await
}

/// Duration of freshly synthesised audio bytes.
///
/// WAV is measured in memory; other formats are spooled to a temp file for
/// `ffprobe`.
pub async fn audio_bytes_duration(
    bytes: &[u8],
    format: AudioFormat,
    ffprobe: &Path,
    timeout: Duration,
) -> Result<Duration, ToolError> {
    if format == AudioFormat::Wav {
        if let Some(d) = wav_duration(bytes) {
            return Ok(d);
        }
    }
    let spool = tempfile::Builder::new()
        .suffix(&format!(".{}", format.extension()))
        .tempfile()?;
    tokio::fs::write(spool.path(), bytes).await?;
    probe_duration(spool.path(), ffprobe, timeout).await
}

/// Canvas size for the video: `dims * scale`, each side rounded to the
/// nearest even number (4:2:0 H.264 needs even dimensions), minimum 2.
pub fn scaled_canvas(dims: (u32, u32), scale: f64) -> (u32, u32) {
    let even = |v: u32| -> u32 {
        let scaled = (v as f64 * scale / 2.0).round() as u32 * 2;
        scaled.max(2)
    };
    (even(dims.0), even(dims.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, samples: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn wav_duration_from_header() {
        let bytes = wav_bytes(8_000, 12_000);
        assert_eq!(wav_duration(&bytes), Some(Duration::from_millis(1_500)));
    }

    #[test]
    fn garbage_is_not_a_wav() {
        assert_eq!(wav_duration(b"ID3\x03\x00 not a wav at all"), None);
    }

    #[test]
    fn truncated_wav_is_rejected() {
        let bytes = wav_bytes(8_000, 8_000);
        assert_eq!(wav_duration(&bytes[..bytes.len() / 2]), None);
    }

    #[test]
    fn probe_output_parsing() {
        assert_eq!(
            parse_probe_seconds("3.250000\n"),
            Some(Duration::from_millis(3_250))
        );
        assert_eq!(parse_probe_seconds("N/A\n"), None);
        assert_eq!(parse_probe_seconds(""), None);
    }

    #[test]
    fn canvas_rounds_to_even() {
        assert_eq!(scaled_canvas((1920, 1080), 1.0), (1920, 1080));
        assert_eq!(scaled_canvas((2000, 1125), 1.0), (2000, 1126));
        assert_eq!(scaled_canvas((2000, 1125), 0.5), (1000, 562));
        assert_eq!(scaled_canvas((3, 3), 0.1), (2, 2));
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b\nc");
    }

    #[tokio::test]
    async fn missing_tool_is_a_spawn_error() {
        let err = run_tool(
            Path::new("/nonexistent/ffmpeg-binary"),
            ["-version"],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
