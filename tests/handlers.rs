//! Handler-level tests using tower::ServiceExt::oneshot.
//!
//! Tests the full Axum router (middleware + handlers) without binding a TCP
//! listener. Faster and more deterministic than E2E tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use hls_relay::config::Config;
use hls_relay::server::{VERSION_HEADER, build_router};
use http_body_util::BodyExt;
use std::time::Duration;
use tower::ServiceExt;

/// Build a test config with sensible defaults.
fn test_config() -> Config {
    Config {
        port: 0,
        is_dev: true,
        proxy_base_url: String::new(),
        upstream_timeout: Duration::from_secs(5),
        default_origin: "https://example.com".to_string(),
        default_referer: "https://example.com/".to_string(),
        default_user_agent: "hls-relay-tests".to_string(),
        allow_header_overrides: false,
        block_private_targets: false,
    }
}

async fn get(config: Config, uri: &str) -> axum::response::Response {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    build_router(config).oneshot(req).await.unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&body).into_owned()
}

// ── Health endpoint ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_200_with_json() {
    let resp = get(test_config(), "/health").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime_seconds"].is_number());
}

#[tokio::test]
async fn all_responses_include_version_header() {
    let resp = get(test_config(), "/health").await;
    let version = resp
        .headers()
        .get(VERSION_HEADER)
        .expect("missing version header");

    assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = get(test_config(), "/nonexistent").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_without_recorder_is_404() {
    let resp = get(test_config(), "/metrics").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── Player page ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn root_serves_player_page() {
    let resp = get(test_config(), "/").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let ct = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(ct.starts_with("text/html"), "got: {}", ct);
    assert!(body_text(resp).await.contains("/proxy?url="));
}

// ── Parameter validation ────────────────────────────────────────────────────

#[tokio::test]
async fn missing_url_is_400() {
    let resp = get(test_config(), "/proxy").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Missing url parameter\n");
}

#[tokio::test]
async fn empty_url_is_400() {
    let resp = get(test_config(), "/proxy?url=").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Missing url parameter\n");
}

#[tokio::test]
async fn relative_url_is_400() {
    let resp = get(test_config(), "/proxy?url=%2Flive%2Findex.m3u8").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.starts_with("Invalid target URL"));
}

#[tokio::test]
async fn non_http_scheme_is_400() {
    let resp = get(test_config(), "/proxy?url=file%3A%2F%2F%2Fetc%2Fpasswd").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn private_target_blocked_when_enabled() {
    let mut config = test_config();
    config.block_private_targets = true;

    let resp = get(config, "/proxy?url=http%3A%2F%2F127.0.0.1%3A9%2Fseg.ts").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unreachable_upstream_is_502_without_details() {
    // Grab a free port, then release it so nothing is listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let uri = format!(
        "/proxy?url={}",
        urlencoding::encode(&format!("http://{}/live/index.m3u8", addr))
    );
    let resp = get(test_config(), &uri).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(resp).await, "Upstream request failed\n");
}

// ── CORS ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn responses_carry_cors_headers() {
    let req = Request::builder()
        .uri("/proxy")
        .header("origin", "https://player.example")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(test_config()).oneshot(req).await.unwrap();

    // Even error responses must be readable cross-origin.
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let exposed = resp.headers()["access-control-expose-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    for name in ["content-range", "content-length", "accept-ranges"] {
        assert!(exposed.contains(name), "{} not exposed: {}", name, exposed);
    }
}

#[tokio::test]
async fn preflight_allows_range_header() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/proxy?url=https%3A%2F%2Fcdn.example.com%2Fseg.ts")
        .header("origin", "https://player.example")
        .header("access-control-request-method", "GET")
        .header("access-control-request-headers", "range")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(test_config()).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    let allowed = resp.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("range"));
}

#[tokio::test]
async fn bare_options_on_any_path_is_answered() {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/anything")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(test_config()).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
