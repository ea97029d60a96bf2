#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use infinitetalk_comfyui::connector::{ConnectorConfig, RetryLadder};
use infinitetalk_pipeline::{Orchestrator, OrchestratorConfig};
use infinitetalk_worker::router::build_app_router;
use infinitetalk_worker::state::AppState;

pub const CLIENT_ID: &str = "intake-test-client";

/// Orchestrator config aimed at a port nothing listens on, with a
/// single-attempt connect ladder.
pub fn test_config(scratch_root: &Path) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new(CLIENT_ID);
    config.comfyui_port = 9;
    config.workflow_dir =
        PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/../../workflows"));
    config.scratch_root = scratch_root.to_path_buf();
    config.default_image_path = scratch_root.join("no-default.jpg");
    config.default_audio_path = scratch_root.join("no-default.mp3");
    config.connector = ConnectorConfig {
        probe: RetryLadder::new(1, Duration::from_millis(10)),
        probe_timeout: Duration::from_millis(200),
        connect: RetryLadder::new(1, Duration::from_millis(10)),
    };
    config
}

/// Build the full application router, as `main.rs` does.
pub fn build_test_app(scratch_root: &Path) -> Router {
    let state = AppState::new(
        Orchestrator::new(test_config(scratch_root)),
        CancellationToken::new(),
    );
    build_app_router(state)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
