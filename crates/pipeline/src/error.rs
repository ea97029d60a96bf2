use std::path::PathBuf;

use infinitetalk_comfyui::connector::ConnectorError;
use infinitetalk_comfyui::monitor::MonitorError;
use infinitetalk_core::media::MediaChannel;

use crate::input::InputError;
use crate::output::OutputError;
use crate::workflow::WorkflowError;

/// Everything that can end a job without a video.
///
/// The `Display` text is what the caller sees in `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid job input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InputResolution(#[from] InputError),

    #[error("{} file not found: {}", .channel.label(), .path.display())]
    MissingFile { channel: MediaChannel, path: PathBuf },

    #[error("Failed to prepare scratch directory {}: {source}", .path.display())]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Connection(#[from] ConnectorError),

    #[error("{0}")]
    Submission(#[source] MonitorError),

    #[error("{0}")]
    Completion(#[source] MonitorError),

    #[error("Execution record not found for prompt {0}")]
    RecordNotFound(String),

    #[error("Video not found.")]
    NoArtifact,

    #[error(transparent)]
    ArtifactRead(#[from] OutputError),
}

impl From<MonitorError> for JobError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::Submission(_) => JobError::Submission(e),
            MonitorError::RecordNotFound(prompt_id) => JobError::RecordNotFound(prompt_id),
            other => JobError::Completion(other),
        }
    }
}
