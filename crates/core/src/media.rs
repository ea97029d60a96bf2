//! Job-shape vocabulary shared by the pipeline and the intake surface.
//!
//! A job is fully shaped by two enums: what drives the subject
//! ([`SubjectMode`]) and how many speakers are animated
//! ([`PersonCount`]). Every input file a job carries belongs to one
//! [`MediaChannel`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// What drives the generated subject: a still image or a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectMode {
    #[default]
    Image,
    Video,
}

/// Number of speakers animated by the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonCount {
    #[default]
    Single,
    Multi,
}

/// One input slot of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaChannel {
    /// The image or video that drives the subject.
    Media,
    /// Audio track of the first speaker.
    Audio,
    /// Audio track of the second speaker (multi-person jobs only).
    SecondaryAudio,
}

impl SubjectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectMode::Image => "image",
            SubjectMode::Video => "video",
        }
    }
}

impl PersonCount {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonCount::Single => "single",
            PersonCount::Multi => "multi",
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, PersonCount::Multi)
    }
}

impl MediaChannel {
    /// Human-readable label used in user-facing error messages.
    pub fn label(&self) -> &'static str {
        match self {
            MediaChannel::Media => "Media",
            MediaChannel::Audio => "Audio",
            MediaChannel::SecondaryAudio => "Second Audio",
        }
    }

    /// File name used when the channel is materialized into a job's
    /// scratch directory.
    pub fn scratch_filename(&self, mode: SubjectMode) -> &'static str {
        match (self, mode) {
            (MediaChannel::Media, SubjectMode::Image) => "input_image.jpg",
            (MediaChannel::Media, SubjectMode::Video) => "input_video.mp4",
            (MediaChannel::Audio, _) => "input_audio.wav",
            (MediaChannel::SecondaryAudio, _) => "input_audio_2.wav",
        }
    }
}

impl fmt::Display for SubjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PersonCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MediaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_mode_deserializes_lowercase() {
        let mode: SubjectMode = serde_json::from_str(r#""video""#).unwrap();
        assert_eq!(mode, SubjectMode::Video);
    }

    #[test]
    fn unknown_person_count_is_rejected() {
        assert!(serde_json::from_str::<PersonCount>(r#""many""#).is_err());
    }

    #[test]
    fn defaults_are_image_single() {
        assert_eq!(SubjectMode::default(), SubjectMode::Image);
        assert_eq!(PersonCount::default(), PersonCount::Single);
    }

    #[test]
    fn scratch_filenames_follow_subject_mode() {
        assert_eq!(
            MediaChannel::Media.scratch_filename(SubjectMode::Image),
            "input_image.jpg"
        );
        assert_eq!(
            MediaChannel::Media.scratch_filename(SubjectMode::Video),
            "input_video.mp4"
        );
        assert_eq!(
            MediaChannel::SecondaryAudio.scratch_filename(SubjectMode::Video),
            "input_audio_2.wav"
        );
    }

    #[test]
    fn channel_labels() {
        assert_eq!(MediaChannel::SecondaryAudio.to_string(), "Second Audio");
    }
}
