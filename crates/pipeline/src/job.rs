//! Job intake model.
//!
//! A job arrives as a flat JSON object. Each input channel may be given
//! as a local path (`*_path`), a URL (`*_url`) or a base64 payload
//! (`*_base64`); the secondary audio channel uses the same keys with a
//! `_2` suffix.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use infinitetalk_core::media::{MediaChannel, PersonCount, SubjectMode};

/// Prompt used when the job does not supply one.
pub const DEFAULT_PROMPT: &str = "A person talking naturally";
/// Output width/height used when the job does not supply them.
pub const DEFAULT_DIMENSION: u32 = 512;

/// Where the bytes of one input channel come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Already on the local filesystem.
    Path(PathBuf),
    /// Must be downloaded.
    Url(String),
    /// Standard base64 payload carried in the job.
    Encoded(String),
}

impl MediaSource {
    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaSource::Path(_) => "path",
            MediaSource::Url(_) => "url",
            MediaSource::Encoded(_) => "base64",
        }
    }
}

/// Raw job input as received from the intake layer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobInput {
    #[serde(default)]
    pub input_type: SubjectMode,
    #[serde(default)]
    pub person_count: PersonCount,

    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,

    pub video_path: Option<String>,
    pub video_url: Option<String>,
    pub video_base64: Option<String>,

    pub wav_path: Option<String>,
    pub wav_url: Option<String>,
    pub wav_base64: Option<String>,

    pub wav_path_2: Option<String>,
    pub wav_url_2: Option<String>,
    pub wav_base64_2: Option<String>,

    pub prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_frame: Option<u32>,
}

/// Terminal result of one job, serialized as `{"video": ...}` or
/// `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Video { video: String },
    Error { error: String },
}

impl JobOutput {
    pub fn error(message: impl Into<String>) -> Self {
        JobOutput::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JobOutput::Error { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            JobOutput::Error { error } => Some(error),
            JobOutput::Video { .. } => None,
        }
    }
}

impl JobInput {
    /// Source of the image or video channel, depending on `input_type`.
    pub fn media_source(&self) -> Option<MediaSource> {
        match self.input_type {
            SubjectMode::Image => pick(
                MediaChannel::Media,
                &self.image_path,
                &self.image_url,
                &self.image_base64,
            ),
            SubjectMode::Video => pick(
                MediaChannel::Media,
                &self.video_path,
                &self.video_url,
                &self.video_base64,
            ),
        }
    }

    pub fn audio_source(&self) -> Option<MediaSource> {
        pick(
            MediaChannel::Audio,
            &self.wav_path,
            &self.wav_url,
            &self.wav_base64,
        )
    }

    pub fn secondary_audio_source(&self) -> Option<MediaSource> {
        pick(
            MediaChannel::SecondaryAudio,
            &self.wav_path_2,
            &self.wav_url_2,
            &self.wav_base64_2,
        )
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    pub fn width(&self) -> u32 {
        self.width.unwrap_or(DEFAULT_DIMENSION)
    }

    pub fn height(&self) -> u32 {
        self.height.unwrap_or(DEFAULT_DIMENSION)
    }
}

/// Choose one source for a channel; path wins over URL, URL over base64.
fn pick(
    channel: MediaChannel,
    path: &Option<String>,
    url: &Option<String>,
    encoded: &Option<String>,
) -> Option<MediaSource> {
    let supplied = [path, url, encoded].iter().filter(|v| v.is_some()).count();
    if supplied > 1 {
        tracing::warn!(
            channel = %channel,
            supplied,
            "Several inputs given for one channel, using the first of path/url/base64",
        );
    }

    if let Some(p) = path {
        Some(MediaSource::Path(PathBuf::from(p)))
    } else if let Some(u) = url {
        Some(MediaSource::Url(u.clone()))
    } else {
        encoded.as_ref().map(|b| MediaSource::Encoded(b.clone()))
    }
}
