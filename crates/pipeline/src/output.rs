//! Turns an execution record into the job's video payload.

use base64::Engine;

use infinitetalk_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use infinitetalk_comfyui::history::{ArtifactRef, ExecutionRecord};

/// Errors raised while reading a produced artifact.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to read output video {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch output video {filename}: {source}")]
    Fetch {
        filename: String,
        #[source]
        source: ComfyUIApiError,
    },
}

/// Reads the first produced video of a record.
pub struct OutputExtractor {
    api: ComfyUIApi,
}

impl OutputExtractor {
    pub fn new(api: ComfyUIApi) -> Self {
        Self { api }
    }

    /// Base64 of the first artifact in record order, or `None` when no
    /// node produced one.
    ///
    /// The worker shares a filesystem with ComfyUI, so `fullpath` is read
    /// directly; entries without one are fetched through `/view`.
    pub async fn extract(&self, record: &ExecutionRecord) -> Result<Option<String>, OutputError> {
        let Some(artifact) = record.first_artifact() else {
            tracing::warn!(prompt_id = %record.prompt_id, "No video produced");
            return Ok(None);
        };

        let bytes = self.load(&artifact).await?;
        tracing::info!(
            prompt_id = %record.prompt_id,
            node = %artifact.node_id,
            bytes = bytes.len(),
            "Read output video",
        );

        Ok(Some(
            base64::engine::general_purpose::STANDARD.encode(bytes),
        ))
    }

    async fn load(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, OutputError> {
        if let Some(path) = &artifact.fullpath {
            return tokio::fs::read(path)
                .await
                .map_err(|source| OutputError::Read {
                    path: path.clone(),
                    source,
                });
        }

        // `from_entry` guarantees a filename when fullpath is absent.
        let filename = artifact.filename.as_deref().unwrap_or_default();
        self.api
            .view(filename, &artifact.subfolder, &artifact.folder_type)
            .await
            .map_err(|source| OutputError::Fetch {
                filename: filename.to_string(),
                source,
            })
    }
}
