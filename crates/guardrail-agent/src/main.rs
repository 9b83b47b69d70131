//! Guardrail Agent - AI feature kill-switch service
//!
//! Receives per-request quality signals, evaluates them against the
//! guardrail thresholds and switches the feature flag off when a bypass
//! trigger fires.

use anyhow::{Context, Result};
use guardrail_agent::{api, config::AgentConfig};
use guardrail_lib::{
    health::{components, HealthRegistry},
    GuardrailMonitor, HttpFlagController, StructuredLogger,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting guardrail-agent");

    let config = AgentConfig::load()?;
    info!(
        service = %config.service_name,
        mode = %config.mode,
        flag_key = %config.flag.flag_key,
        environment = %config.flag.environment_key,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MONITOR).await;
    health_registry.register(components::FLAG_CONTROLLER).await;

    let flags = HttpFlagController::new(config.flag.clone())
        .context("Failed to create flag control plane client")?;
    if !flags.is_configured() {
        health_registry
            .set_degraded(components::FLAG_CONTROLLER, "No flag API token configured")
            .await;
    }

    let monitor = GuardrailMonitor::new(
        config.service_name.clone(),
        config.thresholds.clone(),
        config.mode,
        Arc::new(flags),
    )
    .with_health_registry(health_registry.clone());

    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(AGENT_VERSION, &config.mode.to_string());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::new(monitor),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {e}"),
                Err(e) => format!("API server task panicked: {e}"),
            };
            error!(reason = %reason, "Guardrail agent stopping");
            logger.log_shutdown(&reason);
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            info!("Shutting down");
        }
    }

    Ok(())
}
