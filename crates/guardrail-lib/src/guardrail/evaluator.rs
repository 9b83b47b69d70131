//! Guardrail evaluation and kill-switch decisions
//!
//! The evaluator reads the recent window from its [`MetricsStore`], tags
//! threshold violations per sample, ranks them into a [`Severity`] and hands
//! out disable recommendations subject to two cooldown timers:
//!
//! - the trigger cooldown gates repeated violation detections
//! - the disable cooldown gates repeated flag disables
//!
//! Severities from [`GuardrailEvaluator::evaluate`] are for dashboards and
//! logs only. Enforcement goes through [`GuardrailEvaluator::should_auto_disable`]
//! and [`GuardrailEvaluator::should_auto_disable_bypass`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::{MetricsStore, WindowSummary};
use super::thresholds::{Cooldowns, MonitorMode, ThresholdConfig};
use crate::clock::{minutes_to_duration, Clock};
use crate::models::{Detection, DisableDecision, QualitySample, QualitySignals, Severity, Violation};

/// Reason returned by the normal path, which never disables
pub const NORMAL_PATH_DISABLED_REASON: &str =
    "Normal metric-based auto-disable is disabled - only bypass triggers allowed";

/// Mutable evaluator bookkeeping, lives as long as the evaluator
#[derive(Debug, Clone, Default)]
pub struct EvaluatorState {
    pub last_trigger_time: Option<DateTime<Utc>>,
    pub last_disable_time: Option<DateTime<Utc>>,
    pub last_detection: Option<Detection>,
}

/// Dashboard view: window statistics plus cooldown timers
#[derive(Debug, Clone, Serialize)]
pub struct GuardrailSummary {
    #[serde(flatten)]
    pub window: WindowSummary,
    pub evaluation_window_minutes: f64,
    pub last_trigger: Option<DateTime<Utc>>,
    pub last_disable: Option<DateTime<Utc>>,
    pub last_detection: Option<Detection>,
}

/// Turns the recent sample window into severities and disable decisions
pub struct GuardrailEvaluator {
    thresholds: ThresholdConfig,
    mode: MonitorMode,
    cooldowns: Cooldowns,
    store: MetricsStore,
    state: EvaluatorState,
    clock: Arc<dyn Clock>,
}

impl GuardrailEvaluator {
    pub fn new(thresholds: ThresholdConfig, mode: MonitorMode, clock: Arc<dyn Clock>) -> Self {
        let store = MetricsStore::new(thresholds.retention_minutes(), clock.clone());
        Self {
            thresholds,
            mode,
            cooldowns: Cooldowns::for_mode(mode),
            store,
            state: EvaluatorState::default(),
            clock,
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn cooldowns(&self) -> Cooldowns {
        self.cooldowns
    }

    pub fn state(&self) -> &EvaluatorState {
        &self.state
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Record one request's quality signals
    pub fn add_sample(&mut self, signals: QualitySignals) -> QualitySample {
        self.store.add(signals)
    }

    /// Evaluate the recent window against the thresholds
    ///
    /// Returns `None` when there is nothing actionable: no data, the trigger
    /// cooldown is running, too few samples, or no violations.
    pub fn evaluate(&mut self) -> Option<Severity> {
        if self.store.is_empty() {
            return None;
        }

        let now = self.clock.now();
        if let Some(last) = self.state.last_trigger_time {
            if now - last < minutes_to_duration(self.cooldowns.trigger_cooldown_minutes) {
                debug!("Trigger cooldown active, skipping evaluation");
                return None;
            }
        }

        let recent = self.store.recent(self.thresholds.evaluation_window_minutes);
        let count = self.thresholds.trigger_threshold_count;
        if recent.len() < count {
            return None;
        }

        let violations: Vec<Violation> = recent
            .iter()
            .skip(recent.len().saturating_sub(count))
            .flat_map(|sample| self.violations_for(&sample.signals))
            .collect();

        if violations.is_empty() {
            return None;
        }

        let severity = classify(&violations);
        let descriptions: Vec<String> = violations.iter().map(ToString::to_string).collect();
        warn!(
            severity = %severity,
            violations = ?descriptions,
            "Guardrail violations detected"
        );

        self.state.last_trigger_time = Some(now);
        self.state.last_detection = Some(Detection {
            severity,
            violations: descriptions,
            detected_at: now,
        });

        Some(severity)
    }

    /// Violation tags for a single sample
    ///
    /// Only errors, accuracy and response time are checked. Grounding and
    /// relevance scores never produce a tag.
    pub fn violations_for(&self, signals: &QualitySignals) -> Vec<Violation> {
        let mut violations = Vec::new();

        if signals.error_occurred {
            violations.push(Violation::SystemError);
        }

        if let Some(accuracy) = signals.accuracy_score {
            if accuracy < self.thresholds.min_accuracy_critical {
                violations.push(Violation::CriticalAccuracy(accuracy));
            } else if accuracy < self.thresholds.min_accuracy_warning {
                violations.push(Violation::LowAccuracy(accuracy));
            }
        }

        if let Some(response_time) = signals.response_time {
            if response_time > self.thresholds.max_response_time {
                violations.push(Violation::HighResponseTime(response_time));
            }
        }

        violations
    }

    /// Whether normal metrics should disable the flag
    ///
    /// Always answers "no". Metric-based auto-disable is turned off on
    /// purpose because automated judging is too noisy to drive a kill-switch.
    /// Do not wire `evaluate()` severities in here; only the bypass path may
    /// disable the flag.
    pub fn should_auto_disable(&self) -> DisableDecision {
        DisableDecision::keep(NORMAL_PATH_DISABLED_REASON)
    }

    /// Disable recommendation for inputs flagged upstream as adversarial
    ///
    /// Skips every threshold check and only honours the disable cooldown.
    pub fn should_auto_disable_bypass(&self, reason_code: &str) -> DisableDecision {
        if let Some(remaining) = self.disable_cooldown_remaining() {
            return DisableDecision::keep(format!(
                "bypass disable cooldown active, {:.1} minutes remaining",
                remaining
            ));
        }

        if reason_code.is_empty() {
            DisableDecision::disable("bypass trigger activated")
        } else {
            DisableDecision::disable(format!("bypass trigger activated ({})", reason_code))
        }
    }

    /// Minutes left on the disable cooldown, if it is running
    pub fn disable_cooldown_remaining(&self) -> Option<f64> {
        let last = self.state.last_disable_time?;
        let elapsed = self.clock.now() - last;
        let cooldown = minutes_to_duration(self.cooldowns.disable_cooldown_minutes);
        if elapsed < cooldown {
            Some((cooldown - elapsed).num_milliseconds() as f64 / 60_000.0)
        } else {
            None
        }
    }

    /// Note that a disable actually succeeded; starts the disable cooldown
    pub fn record_flag_disable(&mut self) {
        let now = self.clock.now();
        self.state.last_disable_time = Some(now);
        warn!(disabled_at = %now.to_rfc3339(), "Flag disable recorded");
    }

    /// Clear both cooldown timers
    pub fn reset_cooldowns(&mut self) {
        self.state.last_trigger_time = None;
        self.state.last_disable_time = None;
        info!("All cooldown timers reset");
    }

    /// Window statistics over the evaluation window plus both timers
    pub fn summary(&self) -> GuardrailSummary {
        self.summary_for(self.thresholds.evaluation_window_minutes)
    }

    /// Window statistics over an arbitrary window plus both timers
    pub fn summary_for(&self, window_minutes: f64) -> GuardrailSummary {
        GuardrailSummary {
            window: self.store.summary(window_minutes),
            evaluation_window_minutes: window_minutes,
            last_trigger: self.state.last_trigger_time,
            last_disable: self.state.last_disable_time,
            last_detection: self.state.last_detection.clone(),
        }
    }
}

/// Rank a non-empty set of violations
fn classify(violations: &[Violation]) -> Severity {
    if violations.iter().any(Violation::is_critical) {
        Severity::Critical
    } else if violations.len() >= 3 {
        Severity::High
    } else if violations.len() >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}
