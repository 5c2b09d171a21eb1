//! Integration tests for the transcript highlight server

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use common::*;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_health_check_under_api_prefix() {
    let app = create_test_app();
    let response = app.oneshot(get("/api/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_start_returns_session_id() {
    let app = create_test_app();
    let response = app.oneshot(post_json("/session/start", json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let session_id = body["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(session_id).is_ok());
    assert!(body["started_at"].is_string());
}

#[tokio::test]
async fn test_transcription_validation_empty_text() {
    let app = create_test_app();
    let response = app
        .oneshot(post_json("/transcription", json!({ "text": "" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_transcription_validation_long_text() {
    let app = create_test_app();
    let response = app
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "a".repeat(65) }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transcription_validation_invalid_session_id() {
    let app = create_test_app();
    let response = app
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "h", "session_id": "not-a-uuid" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transcription_rejects_stale_session() {
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(post_json("/session/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A producer still holding an old (or fabricated) session id must not
    // feed the active session.
    let stale = uuid::Uuid::new_v4().to_string();
    let response = app
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "h", "session_id": stale }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_transcription_rejects_session_id_when_none_active() {
    let app = create_test_app();
    let claimed = uuid::Uuid::new_v4().to_string();
    let response = app
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "h", "session_id": claimed }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_transcription_accumulates_transcript_in_order() {
    let app = create_test_app();

    // No explicit start: the first unit opens a session implicitly.
    let response = app
        .clone()
        .oneshot(post_json(
            "/transcription",
            json!({ "type": "transcription", "text": "h", "start_time": 0.0, "end_time": 0.12 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = json_body(response).await;
    assert_eq!(ack["index"], 0);
    let session_id = ack["session_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "i", "start_time": 0.12, "end_time": 0.25, "session_id": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ack = json_body(response).await;
    assert_eq!(ack["index"], 1);

    let response = app.oneshot(get("/transcript")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let transcript = json_body(response).await;
    let units = transcript["units"].as_array().unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0]["text"], "h");
    assert_eq!(units[1]["text"], "i");
    assert_eq!(units[1]["index"], 1);
}

#[tokio::test]
async fn test_transcription_without_timing_still_appears() {
    let app = create_test_app();
    let response = app
        .clone()
        .oneshot(post_json("/transcription", json!({ "text": "x" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let transcript = json_body(app.oneshot(get("/transcript")).await.unwrap()).await;
    assert_eq!(transcript["units"].as_array().unwrap().len(), 1);
    assert_eq!(transcript["highlighted"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_session_stop_persists_alignment_and_clears_transcript() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json("/session/start", json!({})))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "h", "start_time": 0.0, "end_time": 0.12 }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "i", "start_time": 0.12, "end_time": 0.25 }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/session/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["units"], 2);
    assert!(body["alignment_file"].is_string());

    // The saved record is readable back.
    let response = app.clone().oneshot(get("/alignment/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = json_body(response).await;
    assert_eq!(record["text"], "hi");
    assert_eq!(record["unit_count"], 2);
    assert_eq!(record["total_duration_ms"], 250);

    // And the live transcript was reset.
    let transcript = json_body(app.oneshot(get("/transcript")).await.unwrap()).await;
    assert!(transcript["units"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_session_stop_without_units_saves_nothing() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json("/session/start", json!({})))
        .await
        .unwrap();
    let response = app
        .clone()
        .oneshot(post_json("/session/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["units"], 0);
    assert!(body["alignment_file"].is_null());

    let response = app.oneshot(get("/alignment/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_start_resets_previous_transcript() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json("/transcription", json!({ "text": "a" })))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/session/start", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let transcript = json_body(app.oneshot(get("/transcript")).await.unwrap()).await;
    assert!(transcript["units"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_metrics_reports_scheduler_counters() {
    let app = create_test_app();

    app.clone()
        .oneshot(post_json(
            "/transcription",
            json!({ "text": "h", "start_time": 0.0, "end_time": 5.0 }),
        ))
        .await
        .unwrap();
    app.clone()
        .oneshot(post_json("/transcription", json!({ "text": "i" })))
        .await
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["scheduler"]["received"], 2);
    assert_eq!(body["scheduler"]["started_in_window"], 1);
    assert_eq!(body["scheduler"]["missing_timing"], 1);
    assert!(body["system"]["memory_total_mb"].is_number());
}

#[tokio::test]
async fn test_not_found_endpoint() {
    let app = create_test_app();
    let response = app.oneshot(get("/nonexistent")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
