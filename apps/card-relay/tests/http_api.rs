//! HTTP API Integration Tests
//!
//! Drives the router in-process against an in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tower::ServiceExt;

use card_relay::{CardEvent, router};
use common::{FakeBroker, TEAM_ID, TOPUP_TOPIC, TestApp};

// =============================================================================
// Helpers
// =============================================================================

async fn get(app: &TestApp, path: &str) -> Response {
    router(app.state.clone())
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_json(app: &TestApp, path: &str, body: &str) -> Response {
    router(app.state.clone())
        .oneshot(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

// =============================================================================
// Health Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_reports_healthy_when_subscribed() {
    let app = TestApp::new(FakeBroker::connected());

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["team_id"], TEAM_ID);
    assert_eq!(body["broker_connected"], true);
    assert_eq!(body["broker_subscribed"], true);
    assert_eq!(body["subscriber_count"], 0);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_reports_degraded_without_broker() {
    let app = TestApp::new(FakeBroker::disconnected());

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["broker_connected"], false);
}

#[tokio::test]
async fn test_liveness_always_ok() {
    let app = TestApp::new(FakeBroker::disconnected());

    let response = get(&app, "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "OK");
}

#[tokio::test]
async fn test_readiness_follows_broker_connection() {
    let app = TestApp::new(FakeBroker::disconnected());
    assert_eq!(
        get(&app, "/readyz").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    app.broker.set_connected(true);
    assert_eq!(get(&app, "/readyz").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_renders_text() {
    let _handle = card_relay::init_metrics();
    let app = TestApp::new(FakeBroker::connected());

    let response = get(&app, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_status_is_empty_before_any_card() {
    let app = TestApp::new(FakeBroker::connected());

    let response = get(&app, "/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_status_returns_last_card() {
    let app = TestApp::new(FakeBroker::connected());
    app.broadcaster
        .broadcast(CardEvent::status("A1B2C3D4", Decimal::from(100)));
    app.broadcaster
        .broadcast(CardEvent::balance("A1B2C3D4", Decimal::from(150)));

    let body = body_json(get(&app, "/status").await).await;
    assert_eq!(body["uid"], "A1B2C3D4");
    assert_eq!(body["balance"], 150);
    assert!(body["last_update"].is_string());
}

// =============================================================================
// Top-Up
// =============================================================================

#[tokio::test]
async fn test_topup_publishes_command() {
    let app = TestApp::new(FakeBroker::connected());

    let response = post_json(&app, "/topup", r#"{"uid": " a1b2c3d4 ", "amount": 50}"#).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Top-up command sent");
    assert_eq!(body["data"]["uid"], "A1B2C3D4");
    assert_eq!(body["data"]["amount"], 50);

    let published = app.broker.published();
    assert_eq!(published.len(), 1);
    let (topic, payload) = &published[0];
    assert_eq!(topic, TOPUP_TOPIC);
    assert_eq!(payload["uid"], "A1B2C3D4");
    assert_eq!(payload["amount"], 50);
    assert_eq!(payload["timestamp"], body["data"]["timestamp"]);
}

#[tokio::test]
async fn test_topup_missing_uid_is_rejected() {
    let app = TestApp::new(FakeBroker::connected());

    let response = post_json(&app, "/topup", r#"{"amount": 50}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({"status": "error", "error": "missing uid"})
    );
    assert!(app.broker.published().is_empty());
}

#[tokio::test]
async fn test_topup_uid_checked_before_amount() {
    let app = TestApp::new(FakeBroker::connected());

    let response = post_json(&app, "/topup", r#"{"uid": "", "amount": -1}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "missing uid");
}

#[tokio::test]
async fn test_topup_invalid_amounts_are_rejected() {
    let app = TestApp::new(FakeBroker::connected());

    for body in [
        r#"{"uid": "A1B2C3D4"}"#,
        r#"{"uid": "A1B2C3D4", "amount": 0}"#,
        r#"{"uid": "A1B2C3D4", "amount": -5}"#,
        r#"{"uid": "A1B2C3D4", "amount": "50"}"#,
    ] {
        let response = post_json(&app, "/topup", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(body_json(response).await["error"], "invalid amount");
    }
    assert!(app.broker.published().is_empty());
}

#[tokio::test]
async fn test_topup_malformed_body_is_rejected() {
    let app = TestApp::new(FakeBroker::connected());

    let response = post_json(&app, "/topup", "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "invalid request body");
}

#[tokio::test]
async fn test_topup_without_broker_is_unavailable() {
    let app = TestApp::new(FakeBroker::disconnected());

    let response = post_json(&app, "/topup", r#"{"uid": "A1B2C3D4", "amount": 50}"#).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "broker not connected");
    assert!(app.broker.published().is_empty());
}

#[tokio::test]
async fn test_topup_validation_precedes_connection_check() {
    let app = TestApp::new(FakeBroker::disconnected());

    let response = post_json(&app, "/topup", r#"{"uid": "A1B2C3D4", "amount": 0}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_topup_publish_failure_is_server_error() {
    let app = TestApp::new(FakeBroker::connected());
    app.broker.reject_publishes("request queue closed");

    let response = post_json(&app, "/topup", r#"{"uid": "A1B2C3D4", "amount": 50}"#).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to send top-up command");
    assert!(
        body["details"]
            .as_str()
            .unwrap()
            .contains("request queue closed")
    );
}

// =============================================================================
// Fallback
// =============================================================================

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = TestApp::new(FakeBroker::connected());

    let response = get(&app, "/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Endpoint not found", "path": "/nope"})
    );
}
