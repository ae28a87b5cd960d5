use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use recordsd::app::build_app;
use recordsd::backend::memory::MemoryBackend;
use recordsd::backend::{Batch, Fields, RecordBackend};
use recordsd::clock::ManualClock;
use recordsd::config::AppConfig;
use recordsd::errors::BackendError;
use recordsd::services::records_service::{RecordsService, ServiceSettings};
use recordsd::state::AppState;

fn router() -> (Router, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 15, 0, 0).unwrap());
    let backend = MemoryBackend::new(Arc::new(clock.clone()));
    let service = RecordsService::new(
        Arc::new(backend),
        Arc::new(clock.clone()),
        ServiceSettings::default(),
    );
    let config = AppConfig {
        server_version: "3".to_string(),
        ..AppConfig::default()
    };
    (build_app(AppState::new(service, config)), clock)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = match router.clone().oneshot(request).await {
        Ok(response) => response,
        Err(err) => panic!("router request failed: {err}"),
    };
    let status = response.status();
    let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(err) => panic!("failed to read response body: {err}"),
    };
    let body = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => panic!("response body is not JSON: {err}"),
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap_or_else(|err| panic!("failed to build request: {err}"))
}

fn with_json(method: &str, uri: &str, body: Value) -> Request<Body> {
    with_raw(method, uri, body.to_string())
}

fn with_raw(method: &str, uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|err| panic!("failed to build request: {err}"))
}

#[tokio::test]
async fn ping_reports_version() {
    let (router, _) = router();
    let (status, body) = send(&router, get("/ping")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "message": "pong", "version": "3"}));
}

#[tokio::test]
async fn upsert_then_fetch_record() {
    let (router, clock) = router();

    let (status, body) = send(
        &router,
        with_json(
            "POST",
            "/record",
            json!({"user_id": "u1", "match": "m1", "input": {"a": 1}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["created_at_set"], true);
    assert_eq!(body["match_id"], "m1");
    assert_eq!(body["updated_at"], "2025-02-01 12:00:00");

    clock.advance(chrono::Duration::seconds(3));
    let (status, body) = send(
        &router,
        with_json(
            "PUT",
            "/record/output",
            json!({"user_id": "u1", "match": "m1", "output": {"b": 2}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created_at_set"], false);

    let (status, body) = send(&router, get("/record?user_id=u1&match=m1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input"], json!({"a": 1}));
    assert_eq!(body["output"], json!({"b": 2}));
    assert_eq!(body["created_at"], "2025-02-01 12:00:00");
    assert_eq!(body["updated_at"], "2025-02-01 12:00:03");
}

#[tokio::test]
async fn missing_record_is_404() {
    let (router, _) = router();
    let (status, body) = send(&router, get("/record?user_id=u1&match=nope")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "not found"}));
}

#[tokio::test]
async fn bad_requests_are_400() {
    let (router, _) = router();

    let cases = [
        with_raw("POST", "/record", "{not json".to_string()),
        with_json("POST", "/record", json!({"user_id": "u1"})),
        with_json("POST", "/record", json!({"user_id": "", "match": "m"})),
        with_json("PUT", "/record/output", json!({"user_id": "u1", "match": "m1"})),
        get("/record?user_id=u1"),
        get("/records"),
        get("/records?user_id=u1&limit=0"),
        get("/records?user_id=u1&offset=-1"),
        get("/records?user_id=u1&limit=abc"),
        with_json("POST", "/records", json!({"limit": 5})),
    ];

    for request in cases {
        let uri = request.uri().to_string();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn recent_records_are_paginated_newest_first() {
    let (router, clock) = router();
    for m in ["m1", "m2", "m3"] {
        send(
            &router,
            with_json("POST", "/record", json!({"user_id": "u1", "match": m, "input": m})),
        )
        .await;
        clock.advance(chrono::Duration::seconds(1));
    }

    let (status, body) = send(&router, get("/records?user_id=u1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["offset"], 0);
    let ids: Vec<&str> = body["items"]
        .as_array()
        .map(|items| items.iter().filter_map(|i| i["match_id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec!["m3", "m2", "m1"]);

    let (status, body) = send(
        &router,
        with_json("POST", "/records", json!({"user_id": "u1", "limit": 1, "offset": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["match_id"], "m2");
    assert_eq!(body["items"][0]["input"], "m2");
}

#[tokio::test]
async fn null_output_keeps_stored_output() {
    let (router, _) = router();
    send(
        &router,
        with_json(
            "POST",
            "/record",
            json!({"user_id": "u1", "match": "m1", "output": {"b": 2}}),
        ),
    )
    .await;

    let (status, _) = send(
        &router,
        with_json(
            "PUT",
            "/record/output",
            json!({"user_id": "u1", "match": "m1", "output": null}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&router, get("/record?user_id=u1&match=m1")).await;
    assert_eq!(body["output"], json!({"b": 2}));
}

/// Backend whose every call fails with a detailed error.
struct Unreachable;

fn unreachable_error() -> BackendError {
    BackendError::WrongType("secret-internal-key".to_string())
}

#[async_trait]
impl RecordBackend for Unreachable {
    async fn execute(&self, _batch: Batch) -> Result<Vec<i64>, BackendError> {
        Err(unreachable_error())
    }

    async fn fields_many(&self, _keys: &[String]) -> Result<Vec<Fields>, BackendError> {
        Err(unreachable_error())
    }

    async fn range_desc(
        &self,
        _key: &str,
        _start: usize,
        _stop: usize,
    ) -> Result<Vec<String>, BackendError> {
        Err(unreachable_error())
    }

    async fn remove_members(&self, _key: &str, _members: &[String]) -> Result<u64, BackendError> {
        Err(unreachable_error())
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Err(unreachable_error())
    }
}

#[tokio::test]
async fn backend_failures_are_500_with_generic_message() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 1, 15, 0, 0).unwrap());
    let service = RecordsService::new(
        Arc::new(Unreachable),
        Arc::new(clock),
        ServiceSettings::default(),
    );
    let router = build_app(AppState::new(service, AppConfig::default()));

    let cases = [
        (
            with_json("POST", "/record", json!({"user_id": "u1", "match": "m1", "input": 1})),
            "failed to upsert record",
        ),
        (
            with_json("PUT", "/record/output", json!({"user_id": "u1", "match": "m1", "output": 1})),
            "failed to set output",
        ),
        (get("/record?user_id=u1&match=m1"), "failed to fetch record"),
        (get("/records?user_id=u1"), "failed to fetch recent records"),
    ];

    for (request, message) in cases {
        let uri = request.uri().to_string();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(body, json!({ "error": message }), "{uri}");
        assert!(!body.to_string().contains("secret-internal-key"), "{uri}");
    }
}
