//! Guardrail policy constants and cooldown presets

use serde::{Deserialize, Serialize};

/// Static threshold policy for violation detection
///
/// The grounding and relevance thresholds are carried for dashboard display
/// only. Those scores are too noisy to gate an automated kill-switch, so the
/// evaluator never reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Accuracy below this is a CRITICAL violation
    pub min_accuracy_critical: f64,
    /// Accuracy below this (but at or above critical) is a warning-level violation
    pub min_accuracy_warning: f64,
    pub min_grounding_critical: f64,
    pub min_grounding_warning: f64,
    pub min_relevance_critical: f64,
    pub min_relevance_warning: f64,
    /// Response time in seconds above which a sample is in violation
    pub max_response_time: f64,
    /// Look-back horizon for aggregation; samples are retained for twice this
    pub evaluation_window_minutes: f64,
    /// Minimum samples in the window before evaluating, and the number of
    /// trailing samples inspected
    pub trigger_threshold_count: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_accuracy_critical: 0.3,
            min_accuracy_warning: 0.5,
            min_grounding_critical: 0.6,
            min_grounding_warning: 0.8,
            min_relevance_critical: 0.5,
            min_relevance_warning: 0.7,
            max_response_time: 15.0,
            evaluation_window_minutes: 2.0,
            trigger_threshold_count: 1,
        }
    }
}

/// A threshold policy that cannot be evaluated
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("{field} must be a finite number greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be between 0 and 1, got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("min_accuracy_critical ({critical}) is above min_accuracy_warning ({warning})")]
    InvertedAccuracy { critical: f64, warning: f64 },

    #[error("trigger_threshold_count must be at least 1")]
    ZeroTriggerCount,
}

impl ThresholdConfig {
    /// How long samples are kept before being pruned
    pub fn retention_minutes(&self) -> f64 {
        self.evaluation_window_minutes * 2.0
    }

    /// Reject policies the store and evaluator cannot act on
    pub fn validate(&self) -> Result<(), ThresholdError> {
        positive("evaluation_window_minutes", self.evaluation_window_minutes)?;
        positive("max_response_time", self.max_response_time)?;

        for (field, value) in [
            ("min_accuracy_critical", self.min_accuracy_critical),
            ("min_accuracy_warning", self.min_accuracy_warning),
            ("min_grounding_critical", self.min_grounding_critical),
            ("min_grounding_warning", self.min_grounding_warning),
            ("min_relevance_critical", self.min_relevance_critical),
            ("min_relevance_warning", self.min_relevance_warning),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ThresholdError::OutOfUnitRange { field, value });
            }
        }

        if self.min_accuracy_critical > self.min_accuracy_warning {
            return Err(ThresholdError::InvertedAccuracy {
                critical: self.min_accuracy_critical,
                warning: self.min_accuracy_warning,
            });
        }
        if self.trigger_threshold_count == 0 {
            return Err(ThresholdError::ZeroTriggerCount);
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ThresholdError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ThresholdError::NotPositive { field, value })
    }
}

/// Deployment mode selecting a cooldown preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Demo,
    Production,
}

impl std::fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorMode::Demo => write!(f, "demo"),
            MonitorMode::Production => write!(f, "production"),
        }
    }
}

/// Hysteresis windows, fixed per mode
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cooldowns {
    /// Minimum time between two violation detections
    pub trigger_cooldown_minutes: f64,
    /// Minimum time between two flag disables
    pub disable_cooldown_minutes: f64,
}

impl Cooldowns {
    pub fn for_mode(mode: MonitorMode) -> Self {
        match mode {
            MonitorMode::Demo => Self {
                trigger_cooldown_minutes: 0.5,
                disable_cooldown_minutes: 0.25,
            },
            MonitorMode::Production => Self {
                trigger_cooldown_minutes: 10.0,
                disable_cooldown_minutes: 30.0,
            },
        }
    }
}
