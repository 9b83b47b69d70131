//! HTTP API for guardrail ingestion, operator actions, health checks and Prometheus metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use guardrail_lib::{
    health::{ComponentStatus, HealthRegistry},
    FlagChange, FlagError, GuardrailMonitor, GuardrailSummary, MitigationReport, MonitorMode,
    QualitySample, RequestOutcome, ThresholdConfig, DEFAULT_RECENT_LIMIT,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub monitor: Arc<GuardrailMonitor>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, monitor: Arc<GuardrailMonitor>) -> Self {
        Self {
            health_registry,
            monitor,
        }
    }
}

/// Body of the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub monitoring: GuardrailSummary,
    pub flag_enabled: bool,
    pub flag_key: String,
    pub environment: String,
    pub project: String,
    pub api_client_enabled: bool,
}

/// Body of the dashboard metrics endpoint
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: Vec<QualitySample>,
    pub summary: GuardrailSummary,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub limit: Option<usize>,
}

/// Optional operator reason for manual flag actions
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of a manual flag action
#[derive(Debug, Serialize)]
pub struct FlagActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlagActionResponse {
    fn from_result(result: Result<FlagChange, FlagError>, message: String) -> (StatusCode, Self) {
        match result {
            Ok(change) => (
                StatusCode::OK,
                Self {
                    success: true,
                    message: Some(message),
                    flag_version: change.version,
                    error: None,
                },
            ),
            Err(e) => (
                StatusCode::BAD_GATEWAY,
                Self {
                    success: false,
                    message: None,
                    flag_version: None,
                    error: Some(e.to_string()),
                },
            ),
        }
    }
}

/// Body of the cooldown reset endpoint
#[derive(Debug, Serialize)]
pub struct ResetCooldownsResponse {
    pub success: bool,
    pub message: String,
    pub mode: MonitorMode,
    pub trigger_cooldown_minutes: f64,
    pub disable_cooldown_minutes: f64,
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode Prometheus metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Record one request outcome and act on the guardrail decision
async fn submit_sample(
    State(state): State<Arc<AppState>>,
    Json(outcome): Json<RequestOutcome>,
) -> Json<MitigationReport> {
    Json(state.monitor.process(outcome).await)
}

async fn guardrail_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.monitor.status().await;
    Json(StatusResponse {
        monitoring: status.monitoring,
        flag_enabled: status.flag_enabled,
        flag_key: status.target.flag_key,
        environment: status.target.environment,
        project: status.target.project,
        api_client_enabled: status.target.configured,
    })
}

async fn guardrail_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> Json<MetricsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Json(MetricsResponse {
        metrics: state.monitor.recent_samples(limit).await,
        summary: state.monitor.summary().await,
        thresholds: state.monitor.thresholds().await,
    })
}

/// Reason from a JSON body, then the query string, then `default`
///
/// A missing or non-JSON body falls through to the query string.
fn action_reason(
    query: ReasonRequest,
    body: Option<Json<ReasonRequest>>,
    default: &str,
) -> String {
    body.and_then(|Json(request)| request.reason)
        .or(query.reason)
        .unwrap_or_else(|| default.to_string())
}

async fn recover(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReasonRequest>,
    body: Option<Json<ReasonRequest>>,
) -> impl IntoResponse {
    let reason = action_reason(query, body, "Manual recovery");
    let result = state.monitor.recover(&reason).await;
    let (status, body) =
        FlagActionResponse::from_result(result, format!("Flag re-enabled: {}", reason));
    (status, Json(body))
}

async fn manual_disable(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReasonRequest>,
    body: Option<Json<ReasonRequest>>,
) -> impl IntoResponse {
    let reason = action_reason(query, body, "Manual disable");
    let result = state.monitor.manual_disable(&reason).await;
    let (status, body) =
        FlagActionResponse::from_result(result, format!("Flag disabled: {}", reason));
    (status, Json(body))
}

async fn reset_cooldowns(State(state): State<Arc<AppState>>) -> Json<ResetCooldownsResponse> {
    let reset = state.monitor.reset_cooldowns().await;
    info!(mode = %reset.mode, "Guardrail cooldowns reset via API");
    Json(ResetCooldownsResponse {
        success: true,
        message: "All cooldown timers reset".to_string(),
        mode: reset.mode,
        trigger_cooldown_minutes: reset.cooldowns.trigger_cooldown_minutes,
        disable_cooldown_minutes: reset.cooldowns.disable_cooldown_minutes,
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/guardrail/samples", post(submit_sample))
        .route("/api/guardrail/status", get(guardrail_status))
        .route("/api/guardrail/metrics", get(guardrail_metrics))
        .route("/api/guardrail/recovery", post(recover))
        .route("/api/guardrail/manual-disable", post(manual_disable))
        .route("/api/guardrail/reset-cooldowns", post(reset_cooldowns))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
