//! Guardrail monitoring for AI responses
//!
//! This module provides:
//! - A time-bounded store of per-request quality samples
//! - Threshold evaluation with severity ranking and cooldowns
//! - Disable recommendations for the feature kill-switch

mod evaluator;
mod store;
mod thresholds;

pub use evaluator::{
    EvaluatorState, GuardrailEvaluator, GuardrailSummary, NORMAL_PATH_DISABLED_REASON,
};
pub use store::{MetricsStore, WindowStats, WindowSummary};
pub use thresholds::{Cooldowns, MonitorMode, ThresholdConfig, ThresholdError};
