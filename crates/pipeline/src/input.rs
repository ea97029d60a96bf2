//! Materializes job inputs as local files.
//!
//! Paths pass through untouched. URLs are downloaded and base64
//! payloads decoded into the job's scratch directory. Nothing here
//! deletes files; scratch directories are cleaned up by the host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;

use crate::job::MediaSource;

/// Total time allowed for one download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while resolving an input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("URL download failed ({url}): {reason}")]
    Download { url: String, reason: String },

    #[error("Base64 decoding failed: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a [`MediaSource`] to a path on the local filesystem.
#[derive(Debug, Clone)]
pub struct InputResolver {
    http: reqwest::Client,
    download_timeout: Duration,
}

impl InputResolver {
    pub fn new(http: reqwest::Client, download_timeout: Duration) -> Self {
        Self {
            http,
            download_timeout,
        }
    }

    /// Produce a local path for `source`.
    ///
    /// Downloads and decoded payloads land at `scratch_dir/filename`;
    /// `scratch_dir` is created on demand.
    pub async fn resolve(
        &self,
        source: &MediaSource,
        scratch_dir: &Path,
        filename: &str,
    ) -> Result<PathBuf, InputError> {
        match source {
            MediaSource::Path(path) => {
                tracing::info!(path = %path.display(), "Using local input path");
                Ok(path.clone())
            }
            MediaSource::Url(url) => {
                tracing::info!(url = %url, "Downloading input");
                let target = scratch_dir.join(filename);
                create_dir(scratch_dir).await?;
                self.download(url, &target).await?;
                tracing::info!(url = %url, path = %target.display(), "Downloaded input");
                Ok(target)
            }
            MediaSource::Encoded(payload) => {
                // Wrapped payloads (`base64` CLI output) carry line breaks.
                let compact: String = payload
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
                let target = scratch_dir.join(filename);
                create_dir(scratch_dir).await?;
                write_file(&target, &bytes).await?;
                tracing::info!(
                    path = %target.display(),
                    bytes = bytes.len(),
                    "Saved base64 input to file",
                );
                Ok(target)
            }
        }
    }

    async fn download(&self, url: &str, target: &Path) -> Result<(), InputError> {
        let fetch = async {
            let response = self.http.get(url).send().await?.error_for_status()?;
            response.bytes().await
        };

        let bytes = match tokio::time::timeout(self.download_timeout, fetch).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::error!(url = %url, error = %e, "Download failed");
                return Err(InputError::Download {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                tracing::error!(url = %url, "Download timed out");
                return Err(InputError::Download {
                    url: url.to_string(),
                    reason: format!(
                        "timed out after {}s",
                        self.download_timeout.as_secs_f64()
                    ),
                });
            }
        };

        write_file(target, &bytes).await
    }
}

async fn create_dir(dir: &Path) -> Result<(), InputError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| InputError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), InputError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })
}
