//! Integration tests for the guardrail agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use guardrail_agent::api::{create_router, AppState};
use guardrail_lib::{
    health::{components, HealthRegistry},
    GuardrailMonitor, InMemoryFlagController, MonitorMode, ThresholdConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    flags: Arc<InMemoryFlagController>,
}

async fn setup_test_app() -> TestApp {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::MONITOR).await;
    health_registry.register(components::FLAG_CONTROLLER).await;

    let flags = Arc::new(InMemoryFlagController::new("rag-bot"));
    let monitor = GuardrailMonitor::new(
        "api-test",
        ThresholdConfig::default(),
        MonitorMode::Production,
        flags.clone(),
    )
    .with_health_registry(health_registry.clone());

    let state = Arc::new(AppState::new(health_registry, Arc::new(monitor)));
    TestApp {
        router: create_router(state.clone()),
        state,
        flags,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let app = setup_test_app().await;

    let (status, health) = get(&app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .set_unhealthy(components::MONITOR, "Evaluator poisoned")
        .await;

    let (status, health) = get(&app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_ready_flag() {
    let app = setup_test_app().await;

    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, readiness) = get(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    post(&app, "/api/guardrail/samples", json!({"accuracy_score": 0.9})).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("guardrail_samples_recorded_total"));
}

#[tokio::test]
async fn test_status_without_data() {
    let app = setup_test_app().await;

    let (status, body) = get(&app, "/api/guardrail/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monitoring"]["status"], "no_recent_data");
    assert!(body["monitoring"]["last_trigger"].is_null());
    assert_eq!(body["flag_enabled"], true);
    assert_eq!(body["flag_key"], "rag-bot");
    assert_eq!(body["environment"], "local");
    assert_eq!(body["api_client_enabled"], true);
}

#[tokio::test]
async fn test_normal_sample_never_disables() {
    let app = setup_test_app().await;

    let (status, report) = post(
        &app,
        "/api/guardrail/samples",
        json!({"accuracy_score": 0.1, "error_occurred": true}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["severity"], "critical");
    assert_eq!(report["decision"]["should_disable"], false);
    assert_eq!(report["flag_disabled"], false);
    assert!(app.flags.enabled());

    let (_, body) = get(&app, "/api/guardrail/status").await;
    assert_eq!(body["monitoring"]["status"], "active");
    assert_eq!(body["monitoring"]["total_requests"], 1);
    assert_eq!(body["monitoring"]["error_rate"], 1.0);
    assert_eq!(body["monitoring"]["last_detection"]["severity"], "critical");
}

#[tokio::test]
async fn test_bypass_sample_disables_once() {
    let app = setup_test_app().await;
    let sample = json!({"accuracy_score": 0.9, "bypass_reason": "prompt_injection"});

    let (_, report) = post(&app, "/api/guardrail/samples", sample.clone()).await;
    assert_eq!(report["decision"]["should_disable"], true);
    assert_eq!(report["flag_disabled"], true);
    assert_eq!(report["flag_version"], 2);
    assert!(!app.flags.enabled());

    let (_, report) = post(&app, "/api/guardrail/samples", sample).await;
    assert_eq!(report["flag_disabled"], false);
    assert!(report["decision"]["reason"]
        .as_str()
        .unwrap()
        .contains("cooldown"));
}

#[tokio::test]
async fn test_failed_disable_degrades_flag_health() {
    let app = setup_test_app().await;
    app.flags.set_failing(true);

    let (status, report) = post(
        &app,
        "/api/guardrail/samples",
        json!({"bypass_reason": "jailbreak"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["flag_disabled"], false);
    assert!(report["flag_error"].as_str().unwrap().contains("503"));

    let (status, health) = get(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"][components::FLAG_CONTROLLER]["status"],
        "degraded"
    );

    let (_, body) = get(&app, "/api/guardrail/status").await;
    assert!(body["monitoring"]["last_disable"].is_null());
}

#[tokio::test]
async fn test_manual_disable_and_recovery() {
    let app = setup_test_app().await;

    let (status, body) = post(
        &app,
        "/api/guardrail/manual-disable",
        json!({"reason": "incident 42"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Flag disabled: incident 42");
    assert_eq!(body["flag_version"], 2);
    assert!(!app.flags.enabled());

    let (status, body) = post(&app, "/api/guardrail/recovery", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Flag re-enabled: Manual recovery");
    assert!(app.flags.enabled());
    assert_eq!(
        app.flags.comments(),
        vec![
            "Manual disable: incident 42".to_string(),
            "Manual recovery: Manual recovery".to_string()
        ]
    );
}

async fn post_empty(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_manual_actions_accept_empty_body() {
    let app = setup_test_app().await;

    let (status, body) = post_empty(&app, "/api/guardrail/manual-disable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Flag disabled: Manual disable");
    assert!(!app.flags.enabled());

    let (status, body) = post_empty(&app, "/api/guardrail/recovery").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Flag re-enabled: Manual recovery");
    assert!(app.flags.enabled());
}

#[tokio::test]
async fn test_manual_actions_take_reason_from_query() {
    let app = setup_test_app().await;

    let (status, body) = post_empty(&app, "/api/guardrail/manual-disable?reason=drill").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Flag disabled: drill");

    let (status, body) = post(
        &app,
        "/api/guardrail/recovery?reason=ignored",
        json!({"reason": "from body"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Flag re-enabled: from body");
    assert_eq!(
        app.flags.comments(),
        vec![
            "Manual disable: drill".to_string(),
            "Manual recovery: from body".to_string()
        ]
    );
}

#[tokio::test]
async fn test_recovery_failure_returns_bad_gateway() {
    let app = setup_test_app().await;
    app.flags.set_failing(true);

    let (status, body) = post(&app, "/api/guardrail/recovery", json!({"reason": "retry"})).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("control plane"));
}

#[tokio::test]
async fn test_reset_cooldowns_reports_policy() {
    let app = setup_test_app().await;
    post(
        &app,
        "/api/guardrail/samples",
        json!({"bypass_reason": "abuse"}),
    )
    .await;

    let (status, body) = post(&app, "/api/guardrail/reset-cooldowns", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "production");
    assert_eq!(body["trigger_cooldown_minutes"], 10.0);
    assert_eq!(body["disable_cooldown_minutes"], 30.0);

    let (_, report) = post(
        &app,
        "/api/guardrail/samples",
        json!({"bypass_reason": "abuse"}),
    )
    .await;
    assert_eq!(report["flag_disabled"], true);
}

#[tokio::test]
async fn test_metrics_lists_samples_and_thresholds() {
    let app = setup_test_app().await;
    for accuracy in [0.9, 0.8, 0.7] {
        post(
            &app,
            "/api/guardrail/samples",
            json!({"accuracy_score": accuracy, "grounding_score": 0.95}),
        )
        .await;
    }

    let (status, body) = get(&app, "/api/guardrail/metrics?limit=2").await;

    assert_eq!(status, StatusCode::OK);
    let samples = body["metrics"].as_array().unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[1]["accuracy_score"], 0.7);
    assert_eq!(samples[1]["grounding_score"], 0.95);
    assert!(samples[1]["timestamp"].is_string());
    assert_eq!(body["summary"]["total_requests"], 3);
    assert_eq!(body["thresholds"]["min_grounding_critical"], 0.6);
    assert_eq!(body["thresholds"]["min_relevance_warning"], 0.7);
}
