//! Synchronous job intake.

use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use infinitetalk_pipeline::JobOutput;

use crate::state::AppState;

/// Body of `POST /runsync`.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Caller-chosen job ID; a UUID is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Raw job input, validated by the pipeline.
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Response of `POST /runsync`.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: String,
    /// Always `COMPLETED`; failures are carried in `output.error`.
    pub status: &'static str,
    pub output: JobOutput,
}

/// POST /runsync -- run one job to completion and return its output.
async fn run_sync(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Json<RunResponse> {
    let id = request
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let _guard = state.job_gate.lock().await;
    tracing::info!(job_id = %id, "Starting job");

    let cancel = state.shutdown.child_token();
    let output = state.orchestrator.handle(request.input, &cancel).await;

    tracing::info!(job_id = %id, failed = output.is_error(), "Job finished");

    Json(RunResponse {
        id,
        status: "COMPLETED",
        output,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/runsync", post(run_sync))
}
