//! Observability infrastructure for the guardrail monitor
//!
//! Provides:
//! - Prometheus metrics (sample intake, score distributions, violations, flag actions)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{QualitySignals, Severity};

/// Buckets for 0-1 quality scores
const SCORE_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Buckets for end-to-end response times (in seconds)
const RESPONSE_TIME_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 3.0, 5.0, 7.5, 10.0, 15.0, 20.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GuardrailMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct GuardrailMetricsInner {
    samples_recorded: IntCounter,
    sample_errors: IntCounter,
    accuracy_score: Histogram,
    response_time_seconds: Histogram,
    violations: IntCounterVec,
    flag_disables: IntCounter,
    flag_disable_failures: IntCounter,
    flag_enables: IntCounter,
    bypass_suppressed: IntCounter,
    window_samples: IntGauge,
}

impl GuardrailMetricsInner {
    fn new() -> Self {
        Self {
            samples_recorded: register_int_counter!(
                "guardrail_samples_recorded_total",
                "Total number of quality samples recorded"
            )
            .expect("Failed to register samples_recorded_total"),

            sample_errors: register_int_counter!(
                "guardrail_sample_errors_total",
                "Total number of samples reporting an upstream pipeline error"
            )
            .expect("Failed to register sample_errors_total"),

            accuracy_score: register_histogram!(
                "guardrail_accuracy_score",
                "Distribution of judged accuracy scores",
                SCORE_BUCKETS.to_vec()
            )
            .expect("Failed to register accuracy_score"),

            response_time_seconds: register_histogram!(
                "guardrail_response_time_seconds",
                "End-to-end response time of monitored requests",
                RESPONSE_TIME_BUCKETS.to_vec()
            )
            .expect("Failed to register response_time_seconds"),

            violations: register_int_counter_vec!(
                "guardrail_violations_total",
                "Guardrail violation detections by severity",
                &["severity"]
            )
            .expect("Failed to register violations_total"),

            flag_disables: register_int_counter!(
                "guardrail_flag_disables_total",
                "Total number of successful flag disables"
            )
            .expect("Failed to register flag_disables_total"),

            flag_disable_failures: register_int_counter!(
                "guardrail_flag_disable_failures_total",
                "Total number of failed flag disable attempts"
            )
            .expect("Failed to register flag_disable_failures_total"),

            flag_enables: register_int_counter!(
                "guardrail_flag_enables_total",
                "Total number of successful flag re-enables"
            )
            .expect("Failed to register flag_enables_total"),

            bypass_suppressed: register_int_counter!(
                "guardrail_bypass_suppressed_total",
                "Bypass triggers suppressed by the disable cooldown"
            )
            .expect("Failed to register bypass_suppressed_total"),

            window_samples: register_int_gauge!(
                "guardrail_window_samples",
                "Number of samples in the current evaluation window"
            )
            .expect("Failed to register window_samples"),
        }
    }
}

/// Guardrail metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GuardrailMetrics {
    _private: (),
}

impl Default for GuardrailMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardrailMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GuardrailMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GuardrailMetricsInner {
        GLOBAL_METRICS.get_or_init(GuardrailMetricsInner::new)
    }

    /// Record an ingested sample
    pub fn observe_sample(&self, signals: &QualitySignals) {
        let inner = self.inner();
        inner.samples_recorded.inc();
        if signals.error_occurred {
            inner.sample_errors.inc();
        }
        if let Some(accuracy) = signals.accuracy_score {
            inner.accuracy_score.observe(accuracy);
        }
        if let Some(response_time) = signals.response_time {
            inner.response_time_seconds.observe(response_time);
        }
    }

    pub fn inc_violations(&self, severity: Severity) {
        self.inner()
            .violations
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    pub fn inc_flag_disables(&self) {
        self.inner().flag_disables.inc();
    }

    pub fn inc_flag_disable_failures(&self) {
        self.inner().flag_disable_failures.inc();
    }

    pub fn inc_flag_enables(&self) {
        self.inner().flag_enables.inc();
    }

    pub fn inc_bypass_suppressed(&self) {
        self.inner().bypass_suppressed.inc();
    }

    pub fn set_window_samples(&self, count: i64) {
        self.inner().window_samples.set(count);
    }
}

/// Structured logger for guardrail events
///
/// Provides consistent JSON-formatted logging for samples, violations
/// and flag actions.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a recorded quality sample
    pub fn log_sample(&self, signals: &QualitySignals) {
        info!(
            event = "sample_recorded",
            service = %self.service,
            accuracy_score = ?signals.accuracy_score,
            grounding_score = ?signals.grounding_score,
            relevance_score = ?signals.relevance_score,
            error_occurred = signals.error_occurred,
            response_time = ?signals.response_time,
            "Guardrail metrics added"
        );
    }

    /// Log a violation detection
    pub fn log_violation(&self, severity: Severity, violations: &[String]) {
        match severity {
            Severity::Critical => {
                warn!(
                    event = "guardrail_violation",
                    service = %self.service,
                    severity = %severity,
                    violations = ?violations,
                    "Critical guardrail violation detected"
                );
            }
            _ => {
                info!(
                    event = "guardrail_violation",
                    service = %self.service,
                    severity = %severity,
                    violations = ?violations,
                    "Guardrail violation detected"
                );
            }
        }
    }

    /// Log a successful flag disable
    pub fn log_flag_disabled(&self, flag_key: &str, reason: &str, version: Option<i64>) {
        warn!(
            event = "flag_disabled",
            service = %self.service,
            flag_key = %flag_key,
            reason = %reason,
            version = ?version,
            "Feature flag disabled"
        );
    }

    /// Log a failed flag disable attempt
    pub fn log_flag_disable_failed(&self, flag_key: &str, reason: &str, error: &str) {
        error!(
            event = "flag_disable_failed",
            service = %self.service,
            flag_key = %flag_key,
            reason = %reason,
            error = %error,
            "Failed to disable feature flag, disable cooldown not engaged"
        );
    }

    /// Log a flag re-enable
    pub fn log_flag_enabled(&self, flag_key: &str, reason: &str, version: Option<i64>) {
        info!(
            event = "flag_enabled",
            service = %self.service,
            flag_key = %flag_key,
            reason = %reason,
            version = ?version,
            "Feature flag re-enabled"
        );
    }

    /// Log a failed flag re-enable
    pub fn log_flag_enable_failed(&self, flag_key: &str, reason: &str, error: &str) {
        error!(
            event = "flag_enable_failed",
            service = %self.service,
            flag_key = %flag_key,
            reason = %reason,
            error = %error,
            "Failed to re-enable feature flag"
        );
    }

    /// Log a bypass trigger held back by the disable cooldown
    pub fn log_bypass_suppressed(&self, reason_code: &str, reason: &str) {
        info!(
            event = "bypass_suppressed",
            service = %self.service,
            reason_code = %reason_code,
            reason = %reason,
            "Bypass trigger suppressed"
        );
    }

    /// Log a cooldown reset
    pub fn log_cooldowns_reset(&self) {
        info!(
            event = "cooldowns_reset",
            service = %self.service,
            "All cooldown timers reset"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "monitor_started",
            service = %self.service,
            version = %version,
            mode = %mode,
            "Guardrail monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            service = %self.service,
            reason = %reason,
            "Guardrail monitor shutting down"
        );
    }
}
