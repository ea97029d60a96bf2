//! In-process stand-in for a ComfyUI server.
//!
//! Serves `/`, `/ws`, `/prompt`, `/history/{id}`, `/view`, `/queue`,
//! `/interrupt` and a `/files/{name}` route for download tests.
//! Submitting a prompt
//! pushes a scripted event sequence to every open WebSocket, ending
//! with the terminal `executing` event for that prompt.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use infinitetalk_comfyui::connector::{ConnectorConfig, RetryLadder};
use infinitetalk_core::ffmpeg::{DurationProbe, FfmpegError};
use infinitetalk_pipeline::OrchestratorConfig;

pub const PROMPT_ID: &str = "prompt-1";
pub const CLIENT_ID: &str = "worker-client-1";

/// Scripted behaviour of the stub.
#[derive(Clone, Default)]
pub struct StubOptions {
    /// `outputs` object returned by `/history/prompt-1`.
    pub outputs: Value,
    /// Answer `/prompt` with 400.
    pub reject_prompt: bool,
    /// Body served by `/view`.
    pub view_bytes: Vec<u8>,
    /// Files served under `/files/{name}`.
    pub files: HashMap<String, Vec<u8>>,
    /// Never emit the terminal `executing` event.
    pub hold_terminal: bool,
    /// Answer the `/ws` upgrade with 404.
    pub reject_ws: bool,
}

pub struct StubState {
    options: StubOptions,
    events: broadcast::Sender<String>,
    /// Requests seen on any route.
    pub hits: AtomicUsize,
    /// Bodies posted to `/prompt`.
    pub submitted: Mutex<Vec<Value>>,
    /// `clientId` values seen on `/ws`.
    pub ws_client_ids: Mutex<Vec<String>>,
    /// `(route, body)` of every `/queue` and `/interrupt` call, in order.
    pub control_calls: Mutex<Vec<(&'static str, Value)>>,
}

pub struct StubBackend {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubBackend {
    pub async fn start(options: StubOptions) -> Self {
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(StubState {
            options,
            events,
            hits: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
            ws_client_ids: Mutex::new(Vec::new()),
            control_calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/", get(root))
            .route("/ws", get(ws_handler))
            .route("/prompt", post(submit))
            .route("/history/{id}", get(history))
            .route("/view", get(view))
            .route("/files/{name}", get(file))
            .route("/queue", post(queue))
            .route("/interrupt", post(interrupt))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn last_submission(&self) -> Value {
        self.state.submitted.lock().unwrap().last().cloned().unwrap()
    }

    pub fn control_calls(&self) -> Vec<(&'static str, Value)> {
        self.state.control_calls.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn root(State(state): State<Arc<StubState>>) -> &'static str {
    state.hits.fetch_add(1, Ordering::SeqCst);
    "ComfyUI"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<StubState>>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if state.options.reject_ws {
        return StatusCode::NOT_FOUND.into_response();
    }
    if let Some(id) = params.get("clientId") {
        state.ws_client_ids.lock().unwrap().push(id.clone());
    }
    // Subscribe before the upgrade completes so no event is missed.
    let rx = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, rx))
        .into_response()
}

async fn forward_events(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    let status = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}},"sid":"stub"}}"#;
    if socket.send(Message::Text(status.into())).await.is_err() {
        return;
    }
    if socket
        .send(Message::Binary(vec![0u8, 1, 2, 3].into()))
        .await
        .is_err()
    {
        return;
    }
    while let Ok(event) = rx.recv().await {
        if socket.send(Message::Text(event.into())).await.is_err() {
            break;
        }
    }
}

async fn submit(
    State(state): State<Arc<StubState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.submitted.lock().unwrap().push(body);

    if state.options.reject_prompt {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "prompt_outputs_failed_validation"}})),
        );
    }

    let script = [
        json!({"type": "execution_start", "data": {"prompt_id": PROMPT_ID}}),
        json!({"type": "executing", "data": {"node": "125", "prompt_id": PROMPT_ID}}),
        json!({"type": "executing", "data": {"node": null, "prompt_id": "someone-else"}}),
        json!({"type": "progress", "data": {"value": 3, "max": 6, "prompt_id": PROMPT_ID, "node": "128"}}),
        json!({"type": "executed", "data": {"node": "131", "output": {}, "prompt_id": PROMPT_ID}}),
        json!({"type": "executing", "data": {"node": null, "prompt_id": PROMPT_ID}}),
    ];
    let emitted = if state.options.hold_terminal {
        &script[..script.len() - 1]
    } else {
        &script[..]
    };
    for event in emitted {
        let _ = state.events.send(event.to_string());
    }

    (
        StatusCode::OK,
        Json(json!({"prompt_id": PROMPT_ID, "number": 1, "node_errors": {}})),
    )
}

async fn history(
    UrlPath(id): UrlPath<String>,
    State(state): State<Arc<StubState>>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if id == PROMPT_ID {
        Json(json!({ PROMPT_ID: {"outputs": state.options.outputs.clone(), "status": {"completed": true}} }))
    } else {
        Json(json!({}))
    }
}

async fn queue(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.control_calls.lock().unwrap().push(("queue", body));
    StatusCode::OK
}

async fn interrupt(State(state): State<Arc<StubState>>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.control_calls.lock().unwrap().push(("interrupt", Value::Null));
    StatusCode::OK
}

async fn view(State(state): State<Arc<StubState>>) -> Vec<u8> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.options.view_bytes.clone()
}

async fn file(
    UrlPath(name): UrlPath<String>,
    State(state): State<Arc<StubState>>,
) -> Result<Vec<u8>, StatusCode> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state
        .options
        .files
        .get(&name)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

// ---------------------------------------------------------------------------
// Orchestrator fixtures
// ---------------------------------------------------------------------------

/// Probe that reports the same duration for every existing file.
pub struct FixedProbe(pub f64);

#[async_trait]
impl DurationProbe for FixedProbe {
    async fn duration_secs(&self, path: &Path) -> Result<f64, FfmpegError> {
        if path.exists() {
            Ok(self.0)
        } else {
            Err(FfmpegError::MediaNotFound(path.display().to_string()))
        }
    }
}

pub fn workflow_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../workflows"))
}

/// Config pointing at `port` with short retry ladders.
pub fn test_config(port: u16, scratch_root: &Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new(CLIENT_ID);
    config.comfyui_port = port;
    config.workflow_dir = workflow_dir();
    config.scratch_root = scratch_root.to_path_buf();
    config.default_image_path = scratch_root.join("missing-default.jpg");
    config.default_audio_path = scratch_root.join("missing-default.mp3");
    config.connector = ConnectorConfig {
        probe: RetryLadder::new(3, Duration::from_millis(20)),
        probe_timeout: Duration::from_millis(500),
        connect: RetryLadder::new(3, Duration::from_millis(20)),
    };
    config.completion_timeout = Some(Duration::from_secs(10));
    config
}
