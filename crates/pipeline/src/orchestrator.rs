//! End-to-end handling of one generation job.
//!
//! ```text
//! resolve inputs -> check files -> estimate frames -> fill template
//!   -> connect (probe + handshake) -> submit + wait -> read video
//! ```
//!
//! Every failure before the connect step returns without touching the
//! backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use infinitetalk_comfyui::api::ComfyUIApi;
use infinitetalk_comfyui::client::ComfyUIClient;
use infinitetalk_comfyui::connector::{BackendConnector, ConnectorConfig};
use infinitetalk_comfyui::monitor::ExecutionMonitor;
use infinitetalk_core::ffmpeg::{DurationProbe, FfprobeDurationProbe};
use infinitetalk_core::media::{MediaChannel, SubjectMode};

use crate::duration::{estimate_frames, DEFAULT_FPS};
use crate::error::JobError;
use crate::input::{InputResolver, DEFAULT_DOWNLOAD_TIMEOUT};
use crate::job::{JobInput, JobOutput, MediaSource};
use crate::output::OutputExtractor;
use crate::workflow::{Bindings, WorkflowTemplateEngine};

/// Default ComfyUI port.
pub const DEFAULT_COMFYUI_PORT: u16 = 8188;
/// Default upper bound on the completion wait.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Everything a job run needs besides the job itself.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Process-scoped client ID presented to ComfyUI on every session.
    pub client_id: String,
    pub comfyui_host: String,
    pub comfyui_port: u16,
    /// Directory holding the four workflow templates.
    pub workflow_dir: PathBuf,
    /// Parent of per-job `task_<uuid>` scratch directories.
    pub scratch_root: PathBuf,
    /// Media used when the job supplies none.
    pub default_image_path: PathBuf,
    /// Audio used when the job supplies none.
    pub default_audio_path: PathBuf,
    pub fps: u32,
    pub download_timeout: Duration,
    pub connector: ConnectorConfig,
    /// `None` waits for the terminal event until cancelled.
    pub completion_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    /// Defaults for a worker running next to ComfyUI on localhost.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            comfyui_host: "127.0.0.1".to_string(),
            comfyui_port: DEFAULT_COMFYUI_PORT,
            workflow_dir: PathBuf::from("workflows"),
            scratch_root: PathBuf::from("."),
            default_image_path: PathBuf::from("/examples/image.jpg"),
            default_audio_path: PathBuf::from("/examples/audio.mp3"),
            fps: DEFAULT_FPS,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            connector: ConnectorConfig::default(),
            completion_timeout: Some(DEFAULT_COMPLETION_TIMEOUT),
        }
    }
}

/// Runs jobs against one ComfyUI instance.
pub struct Orchestrator {
    config: OrchestratorConfig,
    probe: Arc<dyn DurationProbe>,
    resolver: InputResolver,
    templates: WorkflowTemplateEngine,
    api: ComfyUIApi,
}

/// Local paths of a job's inputs, checked to exist.
struct ResolvedInputs {
    media: PathBuf,
    audio: PathBuf,
    second_audio: Option<PathBuf>,
}

impl Orchestrator {
    /// Orchestrator measuring audio with `ffprobe`.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_probe(config, Arc::new(FfprobeDurationProbe))
    }

    pub fn with_probe(config: OrchestratorConfig, probe: Arc<dyn DurationProbe>) -> Self {
        let http = reqwest::Client::new();
        let api = ComfyUIApi::with_client(
            http.clone(),
            format!("http://{}:{}", config.comfyui_host, config.comfyui_port),
        );

        Self {
            resolver: InputResolver::new(http, config.download_timeout),
            templates: WorkflowTemplateEngine::new(config.workflow_dir.clone()),
            api,
            probe,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Parse raw job input and run it, folding any failure into
    /// `{"error": ...}`.
    pub async fn handle(&self, raw: serde_json::Value, cancel: &CancellationToken) -> JobOutput {
        tracing::info!(input = %summarize(&raw), "Received job input");

        // A job without `input` runs on defaults.
        let raw = if raw.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            raw
        };
        let input = match serde_json::from_value::<JobInput>(raw) {
            Ok(input) => input,
            Err(e) => {
                let err = JobError::InvalidInput(e.to_string());
                tracing::error!(error = %err, "Rejected job input");
                return JobOutput::error(err.to_string());
            }
        };

        match self.run_job(&input, cancel).await {
            Ok(video) => JobOutput::Video { video },
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                JobOutput::error(e.to_string())
            }
        }
    }

    /// Run one job and return the base64 video.
    pub async fn run_job(
        &self,
        input: &JobInput,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        let task_id = format!("task_{}", uuid::Uuid::new_v4());
        let span = tracing::info_span!(
            "job",
            task_id = %task_id,
            input_type = %input.input_type,
            person_count = %input.person_count,
        );

        self.run_job_inner(input, &task_id, cancel)
            .instrument(span)
            .await
    }

    async fn run_job_inner(
        &self,
        input: &JobInput,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, JobError> {
        let scratch_dir = std::path::absolute(self.config.scratch_root.join(task_id))
            .map_err(|source| JobError::Scratch {
                path: self.config.scratch_root.join(task_id),
                source,
            })?;

        let inputs = self.resolve_inputs(input, &scratch_dir).await?;
        self.check_inputs(&inputs).await?;

        let max_frames = match input.max_frame {
            Some(frames) => {
                tracing::info!(max_frames = frames, "Using requested max frames");
                frames
            }
            None => {
                estimate_frames(
                    self.probe.as_ref(),
                    &inputs.audio,
                    inputs.second_audio.as_deref(),
                    self.config.fps,
                )
                .await
            }
        };

        let mut template = self
            .templates
            .build(input.input_type, input.person_count)
            .await?;
        let bindings = Bindings {
            media_path: inputs.media,
            audio_path: inputs.audio,
            second_audio_path: inputs.second_audio,
            prompt: input.prompt_text().to_string(),
            width: input.width(),
            height: input.height(),
            max_frames,
        };
        tracing::info!(
            prompt = %bindings.prompt,
            width = bindings.width,
            height = bindings.height,
            max_frames,
            "Workflow configuration",
        );
        template.apply(&bindings)?;
        let graph = template.into_value();

        let client = ComfyUIClient::for_address(
            self.config.client_id.clone(),
            &self.config.comfyui_host,
            self.config.comfyui_port,
        );
        let mut connector = BackendConnector::new(self.api.clone(), client, self.config.connector);
        let mut session = connector.connect(cancel).await?;

        let monitor = ExecutionMonitor::new(self.api.clone(), self.config.completion_timeout);
        let record = monitor.run(&mut session, &graph, cancel).await;
        if let Err(e) = session.close().await {
            tracing::debug!(error = %e, "Failed to close ComfyUI session cleanly");
        }
        let record = record?;

        OutputExtractor::new(self.api.clone())
            .extract(&record)
            .await?
            .ok_or(JobError::NoArtifact)
    }

    async fn resolve_inputs(
        &self,
        input: &JobInput,
        scratch_dir: &Path,
    ) -> Result<ResolvedInputs, JobError> {
        let mode = input.input_type;

        let media = self
            .resolve_channel(
                MediaChannel::Media,
                mode,
                input.media_source(),
                &self.config.default_image_path,
                scratch_dir,
            )
            .await?;
        let audio = self
            .resolve_channel(
                MediaChannel::Audio,
                mode,
                input.audio_source(),
                &self.config.default_audio_path,
                scratch_dir,
            )
            .await?;

        let second_audio = if input.person_count.is_multi() {
            let source = input.secondary_audio_source();
            if source.is_none() {
                tracing::info!("Second audio not provided, using first audio");
            }
            Some(
                self.resolve_channel(
                    MediaChannel::SecondaryAudio,
                    mode,
                    source,
                    &audio,
                    scratch_dir,
                )
                .await?,
            )
        } else {
            None
        };

        Ok(ResolvedInputs {
            media,
            audio,
            second_audio,
        })
    }

    async fn resolve_channel(
        &self,
        channel: MediaChannel,
        mode: SubjectMode,
        source: Option<MediaSource>,
        fallback: &Path,
        scratch_dir: &Path,
    ) -> Result<PathBuf, JobError> {
        match source {
            Some(source) => {
                tracing::info!(channel = %channel, kind = source.kind(), "Resolving input");
                Ok(self
                    .resolver
                    .resolve(&source, scratch_dir, channel.scratch_filename(mode))
                    .await?)
            }
            None => {
                tracing::info!(channel = %channel, path = %fallback.display(), "Using default input");
                Ok(fallback.to_path_buf())
            }
        }
    }

    async fn check_inputs(&self, inputs: &ResolvedInputs) -> Result<(), JobError> {
        let channels = [
            (MediaChannel::Media, Some(&inputs.media)),
            (MediaChannel::Audio, Some(&inputs.audio)),
            (MediaChannel::SecondaryAudio, inputs.second_audio.as_ref()),
        ];

        for (channel, path) in channels {
            let Some(path) = path else { continue };
            match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    tracing::info!(
                        channel = %channel,
                        path = %path.display(),
                        bytes = meta.len(),
                        "Input file ready",
                    );
                }
                Err(_) => {
                    tracing::error!(channel = %channel, path = %path.display(), "Input file does not exist");
                    return Err(JobError::MissingFile {
                        channel,
                        path: path.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Log-friendly view of the raw input with base64 payloads elided.
fn summarize(raw: &serde_json::Value) -> serde_json::Value {
    let mut copy = raw.clone();
    if let Some(fields) = copy.as_object_mut() {
        for (key, value) in fields.iter_mut() {
            if key.contains("base64") {
                let len = value.as_str().map_or(0, str::len);
                *value = serde_json::Value::String(format!("<{len} chars>"));
            }
        }
    }
    copy
}
