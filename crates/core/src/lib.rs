//! Shared vocabulary for the InfiniteTalk generation worker.
//!
//! Holds the job-shape enums used across crates and the `ffprobe`
//! wrapper used to measure audio length.

pub mod ffmpeg;
pub mod media;
