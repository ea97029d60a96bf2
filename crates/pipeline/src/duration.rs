//! Output length estimation from audio duration.

use std::path::Path;

use infinitetalk_core::ffmpeg::DurationProbe;

/// Frame count used when no audio duration can be measured. This is the
/// shortest clip the templates generate.
pub const DEFAULT_FRAME_COUNT: u32 = 81;

/// Frames added on top of the audio length for the model's priming window.
pub const PRIMING_FRAMES: u32 = 81;

/// Frame rate the templates render at.
pub const DEFAULT_FPS: u32 = 25;

/// Derive a frame count from the longest of the supplied audio tracks.
///
/// A probe failure only drops that track from consideration. With no
/// usable duration at all, [`DEFAULT_FRAME_COUNT`] is returned.
pub async fn estimate_frames(
    probe: &dyn DurationProbe,
    primary: &Path,
    secondary: Option<&Path>,
    fps: u32,
) -> u32 {
    let mut longest: Option<f64> = None;

    for path in std::iter::once(primary).chain(secondary) {
        match probe.duration_secs(path).await {
            Ok(secs) => {
                tracing::info!(path = %path.display(), duration_secs = secs, "Audio duration");
                longest = Some(longest.map_or(secs, |l| l.max(secs)));
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to calculate audio duration",
                );
            }
        }
    }

    match longest {
        Some(secs) => {
            let frames = (secs * fps as f64).floor() as u32 + PRIMING_FRAMES;
            tracing::info!(duration_secs = secs, frames, "Calculated max frames from audio");
            frames
        }
        None => {
            tracing::warn!(
                frames = DEFAULT_FRAME_COUNT,
                "Cannot calculate audio duration, using default frame count",
            );
            DEFAULT_FRAME_COUNT
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use infinitetalk_core::ffmpeg::FfmpegError;

    use super::*;

    /// Probe returning canned durations; unknown paths fail.
    struct FixedProbe(HashMap<PathBuf, f64>);

    impl FixedProbe {
        fn new(entries: &[(&str, f64)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(p, d)| (PathBuf::from(p), *d))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration_secs(&self, path: &Path) -> Result<f64, FfmpegError> {
            self.0
                .get(path)
                .copied()
                .ok_or_else(|| FfmpegError::MediaNotFound(path.display().to_string()))
        }
    }

    #[tokio::test]
    async fn single_track() {
        let probe = FixedProbe::new(&[("/a.wav", 4.0)]);
        let frames = estimate_frames(&probe, Path::new("/a.wav"), None, 25).await;
        assert_eq!(frames, 181);
    }

    #[tokio::test]
    async fn longer_second_speaker_governs() {
        let probe = FixedProbe::new(&[("/a.wav", 4.0), ("/b.wav", 6.0)]);
        let frames =
            estimate_frames(&probe, Path::new("/a.wav"), Some(Path::new("/b.wav")), 25).await;
        assert_eq!(frames, 231);
    }

    #[tokio::test]
    async fn all_probes_failing_falls_back_to_default() {
        let probe = FixedProbe::new(&[]);
        let frames =
            estimate_frames(&probe, Path::new("/a.wav"), Some(Path::new("/b.wav")), 25).await;
        assert_eq!(frames, 81);
    }

    #[tokio::test]
    async fn failed_probe_is_excluded_not_zero() {
        let probe = FixedProbe::new(&[("/b.wav", 2.0)]);
        let frames =
            estimate_frames(&probe, Path::new("/a.wav"), Some(Path::new("/b.wav")), 25).await;
        assert_eq!(frames, 131);
    }

    #[tokio::test]
    async fn fractional_frames_are_floored() {
        let probe = FixedProbe::new(&[("/a.wav", 3.526531)]);
        let frames = estimate_frames(&probe, Path::new("/a.wav"), None, 25).await;
        // 3.526531 * 25 = 88.16
        assert_eq!(frames, 88 + 81);
    }
}
