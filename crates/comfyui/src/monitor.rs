//! Submission and completion tracking for a single prompt.
//!
//! [`ExecutionMonitor::run`] submits a workflow over HTTP, then reads
//! frames from the session's WebSocket until ComfyUI reports that no
//! node is left to execute for that prompt, and finally fetches the
//! prompt's [`ExecutionRecord`].
//!
//! The wait is bounded by an optional deadline and a
//! [`CancellationToken`]; frames for other prompts, per-node
//! `executing` frames, and binary preview frames are skipped.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::ComfyUISession;
use crate::history::ExecutionRecord;
use crate::messages::{parse_message, ComfyUIMessage};

/// Errors raised while submitting or waiting on a prompt.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// ComfyUI rejected the workflow or the request failed.
    #[error("Failed to submit workflow: {0}")]
    Submission(#[source] ComfyUIApiError),

    /// The WebSocket closed before the terminal event arrived.
    #[error("WebSocket closed before prompt {prompt_id} finished")]
    StreamClosed { prompt_id: String },

    /// A receive error on the WebSocket.
    #[error("WebSocket receive error: {0}")]
    Receive(String),

    /// The completion deadline passed.
    #[error("Prompt {prompt_id} did not finish within {timeout:?}")]
    Timeout { prompt_id: String, timeout: Duration },

    /// The wait was cancelled from outside.
    #[error("Waiting for prompt {prompt_id} was cancelled")]
    Cancelled { prompt_id: String },

    /// The history lookup failed.
    #[error("Failed to fetch execution history: {0}")]
    History(#[source] ComfyUIApiError),

    /// History has no entry for the prompt.
    #[error("Execution record not found for prompt {0}")]
    RecordNotFound(String),
}

/// Submits workflows and waits for them to finish.
pub struct ExecutionMonitor {
    api: ComfyUIApi,
    completion_timeout: Option<Duration>,
}

impl ExecutionMonitor {
    /// * `completion_timeout` - upper bound on the terminal-event wait;
    ///   `None` waits until cancelled.
    pub fn new(api: ComfyUIApi, completion_timeout: Option<Duration>) -> Self {
        Self {
            api,
            completion_timeout,
        }
    }

    /// Submit `workflow`, wait for it to finish, and fetch its record.
    pub async fn run(
        &self,
        session: &mut ComfyUISession,
        workflow: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<ExecutionRecord, MonitorError> {
        let response = self
            .api
            .submit_workflow(workflow, &session.client_id)
            .await
            .map_err(|e| {
                if let ComfyUIApiError::ApiError { status, reason, .. } = &e {
                    tracing::error!(status, reason = %reason, "ComfyUI rejected workflow");
                }
                MonitorError::Submission(e)
            })?;

        let prompt_id = response.prompt_id;
        tracing::info!(
            prompt_id = %prompt_id,
            queue_number = response.number,
            "Workflow submitted to ComfyUI",
        );
        if response
            .node_errors
            .as_object()
            .is_some_and(|errors| !errors.is_empty())
        {
            tracing::warn!(
                prompt_id = %prompt_id,
                node_errors = %response.node_errors,
                "ComfyUI reported node errors on submission",
            );
        }

        let waited = wait_for_completion(
            &mut session.ws_stream,
            &prompt_id,
            cancel,
            self.completion_timeout,
        )
        .await;

        if let Err(e) = waited {
            if matches!(
                e,
                MonitorError::Timeout { .. } | MonitorError::Cancelled { .. }
            ) {
                self.abandon(&prompt_id).await;
            }
            return Err(e);
        }

        self.fetch_record(&prompt_id).await
    }

    /// Look up the execution record for a finished prompt.
    pub async fn fetch_record(&self, prompt_id: &str) -> Result<ExecutionRecord, MonitorError> {
        let history = self
            .api
            .get_history(prompt_id)
            .await
            .map_err(MonitorError::History)?;

        ExecutionRecord::from_history(prompt_id, &history)
            .ok_or_else(|| MonitorError::RecordNotFound(prompt_id.to_string()))
    }

    /// Best-effort removal of a prompt we stopped waiting on.
    async fn abandon(&self, prompt_id: &str) {
        if let Err(e) = self.api.cancel_execution(prompt_id).await {
            tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to dequeue prompt");
        }
        if let Err(e) = self.api.interrupt().await {
            tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to interrupt ComfyUI");
        }
    }
}

/// Consume frames until the terminal `executing` event for `prompt_id`.
///
/// Returns the number of frames consumed, including the terminal one.
/// Frames after the terminal event are left unread in `stream`.
pub async fn wait_for_completion<S>(
    stream: &mut S,
    prompt_id: &str,
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<u64, MonitorError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut frames = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(MonitorError::Cancelled { prompt_id: prompt_id.to_string() });
            }
            _ = sleep_until_deadline(deadline) => {
                tracing::error!(prompt_id = %prompt_id, "Timed out waiting for prompt to finish");
                return Err(MonitorError::Timeout {
                    prompt_id: prompt_id.to_string(),
                    timeout: timeout.unwrap_or_default(),
                });
            }
            next = stream.next() => next,
        };

        frames += 1;
        match next {
            Some(Ok(Message::Text(text))) => {
                if is_terminal(&text, prompt_id) {
                    tracing::info!(
                        prompt_id = %prompt_id,
                        frames,
                        "Execution completed (all nodes done)",
                    );
                    return Ok(frames);
                }
            }
            Some(Ok(Message::Binary(_))) => {
                // Preview images.
                tracing::trace!(prompt_id = %prompt_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(prompt_id = %prompt_id, ?frame, "ComfyUI WebSocket closed");
                return Err(MonitorError::StreamClosed {
                    prompt_id: prompt_id.to_string(),
                });
            }
            Some(Err(e)) => {
                tracing::error!(prompt_id = %prompt_id, error = %e, "WebSocket receive error");
                return Err(MonitorError::Receive(e.to_string()));
            }
            None => {
                return Err(MonitorError::StreamClosed {
                    prompt_id: prompt_id.to_string(),
                });
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Decode one text frame and report whether it ends `prompt_id`.
fn is_terminal(text: &str, prompt_id: &str) -> bool {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognized ComfyUI message");
            return false;
        }
    };

    match msg {
        ComfyUIMessage::Executing(data) => {
            if data.finishes(prompt_id) {
                return true;
            }
            if let Some(node) = data.node.as_deref().filter(|n| !n.is_empty()) {
                tracing::debug!(prompt_id = ?data.prompt_id, node = %node, "Executing node");
            }
            false
        }
        ComfyUIMessage::Progress(data) => {
            tracing::debug!(
                node = ?data.node,
                value = data.value,
                max = data.max,
                percent = data.percent(),
                "Generation progress",
            );
            false
        }
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution started");
            false
        }
        ComfyUIMessage::ExecutionCached(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, cached = data.nodes.len(), "Execution used cache");
            false
        }
        ComfyUIMessage::Executed(data) => {
            tracing::debug!(
                prompt_id = %data.prompt_id,
                node = %data.node,
                files = ?data.media_files(),
                "Node executed with output",
            );
            false
        }
        ComfyUIMessage::ExecutionError(data) => {
            if data.prompt_id == prompt_id {
                tracing::error!(
                    prompt_id = %data.prompt_id,
                    node_id = %data.node_id,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "Execution error",
                );
            }
            false
        }
        ComfyUIMessage::Status(data) => {
            tracing::debug!(
                queue_remaining = data.queue_remaining(),
                "ComfyUI queue status",
            );
            false
        }
    }
}
