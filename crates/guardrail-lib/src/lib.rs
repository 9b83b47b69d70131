//! Guardrail library for AI feature kill-switches
//!
//! This crate provides the core functionality for:
//! - Recording per-request quality signals in a time-bounded store
//! - Threshold evaluation with severity ranking and cooldown hysteresis
//! - Switching a remote feature flag off through a flag control plane
//! - Health checks and observability

pub mod clock;
pub mod flag;
pub mod guardrail;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;

pub use clock::{Clock, ManualClock, SystemClock};
pub use flag::{
    FlagApiConfig, FlagChange, FlagController, FlagError, FlagTarget, HttpFlagController,
    InMemoryFlagController,
};
pub use guardrail::{
    Cooldowns, GuardrailEvaluator, GuardrailSummary, MetricsStore, MonitorMode, ThresholdConfig,
    ThresholdError, WindowStats, WindowSummary,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{
    CooldownReset, GuardrailMonitor, MitigationReport, MonitorStatus, RequestOutcome,
    DEFAULT_RECENT_LIMIT,
};
pub use observability::{GuardrailMetrics, StructuredLogger};
