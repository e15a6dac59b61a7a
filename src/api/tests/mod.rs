use super::*;
use crate::fetcher::test_helpers::{TestHarness, harness_with, wait_terminal};
use crate::pipeline::test_helpers::{StubBackend, StubMediaTool, downloading};
use axum::body::Body;
use axum::extract::Request;
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;


fn video_backend() -> StubBackend {
    StubBackend {
        events: vec![downloading(5, 10, "v.f137"), downloading(10, 10, "v.f137")],
        ..StubBackend::producing(".mkv", "video:vp9,audio:opus")
    }
}

/// Harness with a fast SSE poll interval
async fn api_harness() -> TestHarness {
    harness_with(Arc::new(video_backend()), StubMediaTool::default(), |c| {
        c.progress.poll_interval = Duration::from_millis(10);
    })
    .await
}

fn router(h: &TestHarness) -> Router {
    create_router(Arc::new(h.fetcher.clone()), h.fetcher.config().clone())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, _, bytes) = send(app, request).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn api_server_binds_an_ephemeral_port() {
    let h = api_harness().await;

    let mut config = (**h.fetcher.config()).clone();
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let handle = tokio::spawn(start_api_server(Arc::new(h.fetcher.clone()), Arc::new(config)));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!handle.is_finished(), "server exited early");
    handle.abort();
}

#[tokio::test]
async fn cors_headers_follow_config() {
    let h = api_harness().await;

    let request = Request::get("/api/v1/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(router(&h), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let h = harness_with(Arc::new(video_backend()), StubMediaTool::default(), |c| {
        c.server.api.cors_enabled = false;
    })
    .await;

    let request = Request::get("/api/v1/health")
        .header("origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(router(&h), request).await;

    assert!(headers.get("access-control-allow-origin").is_none());
}
