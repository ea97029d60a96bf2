//! Integration tests for the HTTP job intake.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, build_test_app, get, post_json, CLIENT_ID};

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_client_id() {
    let scratch = tempfile::tempdir().unwrap();
    let response = get(build_test_app(scratch.path()), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    let json = body_json(response).await;
    assert_eq!(json, json!({"status": "ok", "client_id": CLIENT_ID}));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let scratch = tempfile::tempdir().unwrap();
    let response = get(build_test_app(scratch.path()), "/run").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// /runsync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_media_is_reported_in_output() {
    let scratch = tempfile::tempdir().unwrap();
    let response = post_json(
        build_test_app(scratch.path()),
        "/runsync",
        json!({"id": "job-1", "input": {"input_type": "image", "image_path": "/x.jpg"}}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(
        json,
        json!({
            "id": "job-1",
            "status": "COMPLETED",
            "output": {"error": "Media file not found: /x.jpg"}
        })
    );
}

#[tokio::test]
async fn invalid_input_type_is_rejected() {
    let scratch = tempfile::tempdir().unwrap();
    let response = post_json(
        build_test_app(scratch.path()),
        "/runsync",
        json!({"id": "job-2", "input": {"input_type": "audio"}}),
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["status"], "COMPLETED");
    let error = json["output"]["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid job input"), "{error}");
}

#[tokio::test]
async fn missing_input_runs_on_defaults() {
    let scratch = tempfile::tempdir().unwrap();
    let response = post_json(
        build_test_app(scratch.path()),
        "/runsync",
        json!({"id": "job-empty"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let fallback = scratch.path().join("no-default.jpg");
    assert_eq!(
        json["output"]["error"],
        format!("Media file not found: {}", fallback.display())
    );
}

#[tokio::test]
async fn missing_id_is_generated() {
    let scratch = tempfile::tempdir().unwrap();
    let response = post_json(
        build_test_app(scratch.path()),
        "/runsync",
        json!({"input": {"image_path": "/x.jpg"}}),
    )
    .await;

    let json = body_json(response).await;
    let id = json["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn unreachable_backend_is_reported_in_output() {
    let scratch = tempfile::tempdir().unwrap();
    let image = scratch.path().join("face.jpg");
    let audio = scratch.path().join("speech.wav");
    std::fs::write(&image, b"jpeg").unwrap();
    std::fs::write(&audio, b"wav").unwrap();

    let response = post_json(
        build_test_app(scratch.path()),
        "/runsync",
        json!({"id": "job-3", "input": {
            "image_path": image.to_str().unwrap(),
            "wav_path": audio.to_str().unwrap(),
            "max_frame": 81
        }}),
    )
    .await;

    let json = body_json(response).await;
    let error = json["output"]["error"].as_str().unwrap();
    assert!(
        error.starts_with("Cannot connect to ComfyUI server after 1 attempts"),
        "{error}"
    );
}

#[tokio::test]
async fn malformed_body_is_a_client_error() {
    let scratch = tempfile::tempdir().unwrap();
    let response = build_test_app(scratch.path())
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/runsync")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn concurrent_jobs_all_complete() {
    let scratch = tempfile::tempdir().unwrap();
    let app = build_test_app(scratch.path());

    let requests = (0..3).map(|i| {
        post_json(
            app.clone(),
            "/runsync",
            json!({"id": format!("job-{i}"), "input": {"image_path": "/x.jpg"}}),
        )
    });
    let responses = spawn_all(requests).await;

    for (i, response) in responses.into_iter().enumerate() {
        let json = body_json(response).await;
        assert_eq!(json["id"], format!("job-{i}"));
        assert_eq!(json["output"]["error"], "Media file not found: /x.jpg");
    }
}

async fn spawn_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    outputs
}
