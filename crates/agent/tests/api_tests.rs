//! Integration tests for the agent's RPC endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stress_lib::{
    load::LoadController,
    rpc::{self, CPU_TARGET_PATH, MEMORY_TARGET_PATH, START_PATH, STOP_PATH},
};
use tower::ServiceExt;

fn setup_test_app() -> (Router, LoadController) {
    let controller = LoadController::new();
    (rpc::router(controller.clone()), controller)
}

async fn post(app: Router, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method("POST").uri(path);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_cpu_target_is_clamped_and_echoed() {
    let (app, controller) = setup_test_app();

    let (status, body) = post(app.clone(), CPU_TARGET_PATH, Some(json!({ "value": 150 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 100);

    let (_, body) = post(app, CPU_TARGET_PATH, Some(json!({ "value": -20 }))).await;
    assert_eq!(body["value"], 0);
    assert_eq!(controller.cpu_target(), 0);
}

#[tokio::test]
async fn test_memory_target_is_clamped_and_echoed() {
    let (app, controller) = setup_test_app();

    let (_, body) = post(app.clone(), MEMORY_TARGET_PATH, Some(json!({ "value": 0 }))).await;
    assert_eq!(body["value"], 1);

    let (_, body) = post(app.clone(), MEMORY_TARGET_PATH, Some(json!({ "value": 9000 }))).await;
    assert_eq!(body["value"], 4096);

    let (_, body) = post(app, MEMORY_TARGET_PATH, Some(json!({ "value": 256 }))).await;
    assert_eq!(body["value"], 256);
    assert_eq!(controller.memory_target_mb(), 256);
}

#[tokio::test]
async fn test_start_and_stop_toggle_active_flag() {
    let (app, controller) = setup_test_app();

    let (_, body) = post(app.clone(), START_PATH, None).await;
    assert_eq!(body["active"], true);
    assert!(controller.is_active());

    // Idempotent
    let (_, body) = post(app.clone(), START_PATH, None).await;
    assert_eq!(body["active"], true);

    let (_, body) = post(app, STOP_PATH, None).await;
    assert_eq!(body["active"], false);
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_malformed_target_is_rejected() {
    let (app, controller) = setup_test_app();

    let (status, _) = post(app, CPU_TARGET_PATH, Some(json!({ "percent": 50 }))).await;

    assert!(status.is_client_error());
    assert_eq!(controller.cpu_target(), 0);
}

#[tokio::test]
async fn test_rpc_paths_reject_get() {
    let (app, _controller) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri(START_PATH)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
