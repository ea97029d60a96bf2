//! FFprobe wrapper for measuring media duration.
//!
//! The generation worker only needs one number out of a media file:
//! its length in seconds. [`probe_media`] runs `ffprobe` and
//! [`parse_duration`] pulls the duration out of its JSON report.
//! [`DurationProbe`] is the seam the pipeline calls through so tests
//! can substitute fixed durations.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

/// Error type for FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("media file not found: {0}")]
    MediaNotFound(String),

    #[error("no duration reported for {0}")]
    MissingDuration(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Something that can report the playback length of a media file.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Duration of the file at `path`, in seconds.
    async fn duration_secs(&self, path: &Path) -> Result<f64, FfmpegError>;
}

/// [`DurationProbe`] backed by the `ffprobe` binary on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeDurationProbe;

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn duration_secs(&self, path: &Path) -> Result<f64, FfmpegError> {
        let probe = probe_media(path).await?;
        parse_duration(&probe)
            .ok_or_else(|| FfmpegError::MissingDuration(path.to_string_lossy().to_string()))
    }
}

/// Run `ffprobe` on a media file and return the parsed JSON output.
pub async fn probe_media(path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first audio stream in the ffprobe output.
fn first_audio_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
}

/// Parse a non-negative, finite seconds value.
fn parse_secs(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
}

/// Parse the media duration in seconds from ffprobe output.
///
/// Prefers the container duration, then the first audio stream, then
/// any stream that reports one.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    parse_secs(probe.format.duration.as_deref())
        .or_else(|| first_audio_stream(probe).and_then(|s| parse_secs(s.duration.as_deref())))
        .or_else(|| {
            probe
                .streams
                .iter()
                .find_map(|s| parse_secs(s.duration.as_deref()))
        })
}
