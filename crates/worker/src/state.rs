use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use infinitetalk_pipeline::Orchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Job pipeline bound to one ComfyUI instance.
    pub orchestrator: Arc<Orchestrator>,
    /// Held for the duration of a job. ComfyUI routes events by client ID,
    /// so two concurrent sessions under the same ID would see each other's
    /// messages.
    pub job_gate: Arc<Mutex<()>>,
    /// Cancelled on shutdown; each job runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, shutdown: CancellationToken) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            job_gate: Arc::new(Mutex::new(())),
            shutdown,
        }
    }
}
