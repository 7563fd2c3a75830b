//! In-process scenario tests for bhs-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot`; no socket is bound.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use bhs_daemon::{routes, state};
use bhs_feeder::WindowParams;
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

fn make_router() -> axum::Router {
    let st = Arc::new(state::AppState::for_config(
        "abc123",
        WindowParams::new(3, 100),
        Duration::from_secs(15),
    ));
    routes::build_router(st)
}

async fn call(router: axum::Router, uri: &str) -> (StatusCode, bytes::Bytes) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

#[tokio::test]
async fn health_returns_200_ok_true() {
    let (status, body) = call(make_router(), "/v1/health").await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "bhs-daemon");
}

#[tokio::test]
async fn status_reports_config_and_empty_history() {
    let (status, body) = call(make_router(), "/v1/status").await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["state"], "idle");
    assert_eq!(json["config_hash"], "abc123");
    assert_eq!(json["window"]["wait_blocks"], 3);
    assert_eq!(json["window"]["lookback_blocks"], 100);
    assert_eq!(json["poll_period_secs"], 15);
    assert_eq!(json["total_runs"], 0);
    assert_eq!(json["total_writes"], 0);
    assert!(json["last_run"].is_null());
}

#[tokio::test]
async fn stream_is_event_stream() {
    let router = make_router();
    let req = Request::builder()
        .method("GET")
        .uri("/v1/stream")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.expect("oneshot failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(ct.starts_with("text/event-stream"), "content-type: {ct}");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (status, _) = call(make_router(), "/v1/run/start").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
