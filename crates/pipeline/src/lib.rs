//! Job orchestration for the InfiniteTalk worker.
//!
//! Takes a job from raw input to a base64 video: resolve inputs,
//! estimate the clip length, fill the workflow template, run it on
//! ComfyUI and read back the produced file.

pub mod duration;
pub mod error;
pub mod input;
pub mod job;
pub mod orchestrator;
pub mod output;
pub mod workflow;

pub use error::JobError;
pub use job::{JobInput, JobOutput};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
