//! Guardrail mitigation loop
//!
//! [`GuardrailMonitor`] wires the evaluator to a [`FlagController`]: it
//! records each request's signals, asks for a decision, switches the flag off
//! when told to and starts the disable cooldown only once the switch actually
//! happened.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::flag::{FlagChange, FlagController, FlagError, FlagTarget};
use crate::guardrail::{
    Cooldowns, GuardrailEvaluator, GuardrailSummary, MonitorMode, ThresholdConfig,
};
use crate::health::{components, HealthRegistry};
use crate::models::{DisableDecision, QualitySample, QualitySignals, Severity};
use crate::observability::{GuardrailMetrics, StructuredLogger};

/// Default number of samples returned for the dashboard
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// One request as seen by the guardrail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOutcome {
    #[serde(flatten)]
    pub signals: QualitySignals,
    /// Set when an upstream filter flagged the input as adversarial
    #[serde(default)]
    pub bypass_reason: Option<String>,
}

impl RequestOutcome {
    pub fn new(signals: QualitySignals) -> Self {
        Self {
            signals,
            bypass_reason: None,
        }
    }

    pub fn with_bypass(mut self, reason_code: impl Into<String>) -> Self {
        self.bypass_reason = Some(reason_code.into());
        self
    }
}

/// What the monitor did with one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationReport {
    pub sample: QualitySample,
    /// Observability-only severity from the evaluation pass
    pub severity: Option<Severity>,
    pub decision: DisableDecision,
    pub flag_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_error: Option<String>,
}

/// Snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub monitoring: GuardrailSummary,
    pub flag_enabled: bool,
    pub target: FlagTarget,
}

/// Active policy after a cooldown reset
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CooldownReset {
    pub mode: MonitorMode,
    #[serde(flatten)]
    pub cooldowns: Cooldowns,
}

/// Shared guardrail state plus the flag it protects
///
/// Two locks guard the state. `evaluator` covers samples and cooldown timers
/// and is never held across a control-plane call. `disable_gate` is taken
/// first by every path that may switch the flag off and is held from the
/// disable decision until the cooldown is recorded. Status reads and
/// normal-path ingestion therefore never wait on the network, while bypass
/// requests queue behind an in-flight disable.
pub struct GuardrailMonitor {
    evaluator: Mutex<GuardrailEvaluator>,
    disable_gate: Mutex<()>,
    flags: Arc<dyn FlagController>,
    metrics: GuardrailMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl GuardrailMonitor {
    pub fn new(
        service: impl Into<String>,
        thresholds: ThresholdConfig,
        mode: MonitorMode,
        flags: Arc<dyn FlagController>,
    ) -> Self {
        Self::with_clock(service, thresholds, mode, flags, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service: impl Into<String>,
        thresholds: ThresholdConfig,
        mode: MonitorMode,
        flags: Arc<dyn FlagController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            evaluator: Mutex::new(GuardrailEvaluator::new(thresholds, mode, clock)),
            disable_gate: Mutex::new(()),
            flags,
            metrics: GuardrailMetrics::new(),
            logger: StructuredLogger::new(service),
            health: None,
        }
    }

    /// Report flag control plane failures to a health registry
    pub fn with_health_registry(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    pub fn flag_target(&self) -> FlagTarget {
        self.flags.target()
    }

    /// Record one request and act on the resulting decision
    ///
    /// Bypass requests hold the disable gate until the outcome of their flag
    /// call is recorded, so two of them cannot both disable inside one
    /// cooldown.
    pub async fn process(&self, outcome: RequestOutcome) -> MitigationReport {
        let _gate = if outcome.bypass_reason.is_some() {
            Some(self.disable_gate.lock().await)
        } else {
            None
        };
        let mut evaluator = self.evaluator.lock().await;

        self.metrics.observe_sample(&outcome.signals);
        self.logger.log_sample(&outcome.signals);
        let sample = evaluator.add_sample(outcome.signals);

        let severity = evaluator.evaluate();
        if let (Some(severity), Some(detection)) = (severity, &evaluator.state().last_detection) {
            self.metrics.inc_violations(severity);
            self.logger.log_violation(severity, &detection.violations);
        }
        self.metrics.set_window_samples(
            evaluator
                .store()
                .recent(evaluator.thresholds().evaluation_window_minutes)
                .len() as i64,
        );

        let decision = match outcome.bypass_reason.as_deref() {
            Some(code) => {
                let decision = evaluator.should_auto_disable_bypass(code);
                if !decision.should_disable {
                    self.metrics.inc_bypass_suppressed();
                    self.logger.log_bypass_suppressed(code, &decision.reason);
                }
                decision
            }
            None => evaluator.should_auto_disable(),
        };

        let mut report = MitigationReport {
            sample,
            severity,
            decision,
            flag_disabled: false,
            flag_version: None,
            flag_error: None,
        };

        if !report.decision.should_disable {
            return report;
        }
        drop(evaluator);

        let comment = format!("Auto-disabled: {}", report.decision.reason);
        match self.disable_flag(&comment, &report.decision.reason).await {
            Ok(change) => {
                self.evaluator.lock().await.record_flag_disable();
                report.flag_disabled = true;
                report.flag_version = change.version;
            }
            Err(e) => report.flag_error = Some(e.to_string()),
        }

        report
    }

    /// Operator disable; bypasses both cooldowns
    pub async fn manual_disable(&self, reason: &str) -> Result<FlagChange, FlagError> {
        let _gate = self.disable_gate.lock().await;
        let change = self
            .disable_flag(&format!("Manual disable: {}", reason), reason)
            .await?;
        self.evaluator.lock().await.record_flag_disable();
        Ok(change)
    }

    /// Operator re-enable
    pub async fn recover(&self, reason: &str) -> Result<FlagChange, FlagError> {
        let flag_key = self.flags.target().flag_key;
        match self.flags.enable(&format!("Manual recovery: {}", reason)).await {
            Ok(change) => {
                self.metrics.inc_flag_enables();
                self.logger.log_flag_enabled(&flag_key, reason, change.version);
                self.mark_flag_health(None).await;
                Ok(change)
            }
            Err(e) => {
                self.logger
                    .log_flag_enable_failed(&flag_key, reason, &e.to_string());
                self.mark_flag_health(Some(&e)).await;
                Err(e)
            }
        }
    }

    pub async fn reset_cooldowns(&self) -> CooldownReset {
        let mut evaluator = self.evaluator.lock().await;
        evaluator.reset_cooldowns();
        self.logger.log_cooldowns_reset();
        CooldownReset {
            mode: evaluator.mode(),
            cooldowns: evaluator.cooldowns(),
        }
    }

    pub async fn status(&self) -> MonitorStatus {
        let monitoring = self.evaluator.lock().await.summary();
        MonitorStatus {
            monitoring,
            flag_enabled: self.flags.is_enabled().await,
            target: self.flags.target(),
        }
    }

    pub async fn summary(&self) -> GuardrailSummary {
        self.evaluator.lock().await.summary()
    }

    /// Newest retained samples, oldest first
    pub async fn recent_samples(&self, limit: usize) -> Vec<QualitySample> {
        self.evaluator.lock().await.store().latest(limit)
    }

    pub async fn thresholds(&self) -> ThresholdConfig {
        self.evaluator.lock().await.thresholds().clone()
    }

    pub async fn mode(&self) -> MonitorMode {
        self.evaluator.lock().await.mode()
    }

    pub async fn cooldowns(&self) -> Cooldowns {
        self.evaluator.lock().await.cooldowns()
    }

    async fn disable_flag(&self, comment: &str, reason: &str) -> Result<FlagChange, FlagError> {
        let flag_key = self.flags.target().flag_key;
        match self.flags.disable(comment).await {
            Ok(change) => {
                self.metrics.inc_flag_disables();
                self.logger.log_flag_disabled(&flag_key, reason, change.version);
                self.mark_flag_health(None).await;
                Ok(change)
            }
            Err(e) => {
                self.metrics.inc_flag_disable_failures();
                self.logger
                    .log_flag_disable_failed(&flag_key, reason, &e.to_string());
                self.mark_flag_health(Some(&e)).await;
                Err(e)
            }
        }
    }

    async fn mark_flag_health(&self, failure: Option<&FlagError>) {
        let Some(registry) = &self.health else {
            return;
        };
        match failure {
            Some(e) => {
                registry
                    .set_degraded(components::FLAG_CONTROLLER, e.to_string())
                    .await
            }
            None => registry.set_healthy(components::FLAG_CONTROLLER).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::flag::InMemoryFlagController;
    use crate::guardrail::NORMAL_PATH_DISABLED_REASON;
    use crate::health::ComponentStatus;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    struct Harness {
        monitor: GuardrailMonitor,
        flags: Arc<InMemoryFlagController>,
        clock: Arc<ManualClock>,
    }

    fn harness(mode: MonitorMode) -> Harness {
        let flags = Arc::new(InMemoryFlagController::new("rag-bot"));
        let clock = Arc::new(ManualClock::default());
        let monitor = GuardrailMonitor::with_clock(
            "test",
            ThresholdConfig::default(),
            mode,
            flags.clone(),
            clock.clone(),
        );
        Harness {
            monitor,
            flags,
            clock,
        }
    }

    /// Controller whose disable call waits until the test releases it
    struct StalledFlagController {
        inner: InMemoryFlagController,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl FlagController for StalledFlagController {
        async fn disable(&self, comment: &str) -> Result<FlagChange, FlagError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.disable(comment).await
        }

        async fn enable(&self, comment: &str) -> Result<FlagChange, FlagError> {
            self.inner.enable(comment).await
        }

        async fn is_enabled(&self) -> bool {
            self.inner.is_enabled().await
        }

        fn target(&self) -> FlagTarget {
            self.inner.target()
        }
    }

    fn bad_answer() -> RequestOutcome {
        RequestOutcome::new(QualitySignals::default().with_accuracy(0.2))
    }

    #[tokio::test]
    async fn test_normal_path_never_disables() {
        let h = harness(MonitorMode::Demo);

        let report = h.monitor.process(bad_answer()).await;

        assert_eq!(report.severity, Some(Severity::Critical));
        assert!(!report.decision.should_disable);
        assert_eq!(report.decision.reason, NORMAL_PATH_DISABLED_REASON);
        assert!(!report.flag_disabled);
        assert!(h.flags.enabled());
    }

    #[tokio::test]
    async fn test_bypass_disables_then_cools_down() {
        let h = harness(MonitorMode::Demo);

        let report = h
            .monitor
            .process(bad_answer().with_bypass("prompt_injection"))
            .await;
        assert!(report.flag_disabled);
        assert_eq!(report.flag_version, Some(2));
        assert!(!h.flags.enabled());
        assert_eq!(
            h.flags.comments(),
            vec!["Auto-disabled: bypass trigger activated (prompt_injection)".to_string()]
        );

        let report = h
            .monitor
            .process(bad_answer().with_bypass("prompt_injection"))
            .await;
        assert!(!report.flag_disabled);
        assert!(report.decision.reason.contains("cooldown"));
        assert_eq!(h.flags.comments().len(), 1);

        // Demo disable cooldown is 15 seconds
        h.clock.advance_minutes(0.3);
        let report = h
            .monitor
            .process(bad_answer().with_bypass("prompt_injection"))
            .await;
        assert!(report.flag_disabled);
        assert_eq!(h.flags.comments().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_disable_does_not_start_cooldown() {
        let h = harness(MonitorMode::Production);
        let registry = HealthRegistry::new();
        registry.register(components::FLAG_CONTROLLER).await;
        let monitor = GuardrailMonitor::with_clock(
            "test",
            ThresholdConfig::default(),
            MonitorMode::Production,
            h.flags.clone(),
            h.clock.clone(),
        )
        .with_health_registry(registry.clone());

        h.flags.set_failing(true);
        let report = monitor.process(bad_answer().with_bypass("jailbreak")).await;
        assert!(report.decision.should_disable);
        assert!(!report.flag_disabled);
        assert!(report.flag_error.as_deref().unwrap_or_default().contains("503"));
        assert!(monitor.summary().await.last_disable.is_none());
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        h.flags.set_failing(false);
        let report = monitor.process(bad_answer().with_bypass("jailbreak")).await;
        assert!(report.flag_disabled);
        assert!(monitor.summary().await.last_disable.is_some());
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_concurrent_bypass_disables_once() {
        let h = harness(MonitorMode::Production);
        let monitor = Arc::new(h.monitor);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let monitor = monitor.clone();
                tokio::spawn(async move { monitor.process(bad_answer().with_bypass("abuse")).await })
            })
            .collect();

        let mut disabled = 0;
        for task in tasks {
            if task.await.unwrap().flag_disabled {
                disabled += 1;
            }
        }
        assert_eq!(disabled, 1);
        assert_eq!(h.flags.comments().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_on_inflight_disable() {
        let flags = Arc::new(StalledFlagController {
            inner: InMemoryFlagController::new("rag-bot"),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let monitor = Arc::new(GuardrailMonitor::with_clock(
            "test",
            ThresholdConfig::default(),
            MonitorMode::Production,
            flags.clone(),
            Arc::new(ManualClock::default()),
        ));

        let pending = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.process(bad_answer().with_bypass("abuse")).await }
        });
        flags.entered.notified().await;

        let summary = timeout(Duration::from_secs(1), monitor.summary())
            .await
            .expect("summary blocked by the flag call");
        assert!(summary.last_disable.is_none());

        let good = RequestOutcome::new(QualitySignals::default().with_accuracy(0.9));
        let report = timeout(Duration::from_secs(1), monitor.process(good))
            .await
            .expect("ingestion blocked by the flag call");
        assert!(!report.flag_disabled);
        assert_eq!(monitor.recent_samples(10).await.len(), 2);

        flags.release.notify_one();
        let report = pending.await.unwrap();
        assert!(report.flag_disabled);
        assert!(monitor.summary().await.last_disable.is_some());
        assert!(!flags.inner.enabled());
    }

    #[tokio::test]
    async fn test_manual_disable_ignores_cooldown_and_recover_enables() {
        let h = harness(MonitorMode::Production);

        h.monitor
            .process(bad_answer().with_bypass("abuse"))
            .await;
        let change = h.monitor.manual_disable("incident 42").await.unwrap();
        assert_eq!(change.version, Some(3));

        let change = h.monitor.recover("fixed retrieval").await.unwrap();
        assert_eq!(change.version, Some(4));
        assert!(h.flags.enabled());
        assert_eq!(
            h.flags.comments()[1..],
            [
                "Manual disable: incident 42".to_string(),
                "Manual recovery: fixed retrieval".to_string()
            ]
        );

        // Recovery does not clear the disable cooldown
        let report = h.monitor.process(bad_answer().with_bypass("abuse")).await;
        assert!(!report.flag_disabled);
    }

    #[tokio::test]
    async fn test_reset_cooldowns_reports_policy() {
        let h = harness(MonitorMode::Production);
        h.monitor.process(bad_answer().with_bypass("abuse")).await;

        let reset = h.monitor.reset_cooldowns().await;
        assert_eq!(reset.mode, MonitorMode::Production);
        assert_eq!(reset.cooldowns.disable_cooldown_minutes, 30.0);

        let summary = h.monitor.summary().await;
        assert!(summary.last_trigger.is_none());
        assert!(summary.last_disable.is_none());
        assert!(summary.last_detection.is_some());

        let report = h.monitor.process(bad_answer().with_bypass("abuse")).await;
        assert!(report.flag_disabled);
    }

    #[tokio::test]
    async fn test_status_and_recent_samples() {
        let h = harness(MonitorMode::Demo);
        for accuracy in [0.9, 0.8, 0.7] {
            h.monitor
                .process(RequestOutcome::new(
                    QualitySignals::default().with_accuracy(accuracy),
                ))
                .await;
        }

        let status = h.monitor.status().await;
        assert!(status.flag_enabled);
        assert_eq!(status.target.flag_key, "rag-bot");
        let stats = status.monitoring.window.stats().unwrap();
        assert_eq!(stats.total_requests, 3);

        let recent = h.monitor.recent_samples(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].signals.accuracy_score, Some(0.7));
    }

    #[test]
    fn test_request_outcome_deserializes_flat_body() {
        let outcome: RequestOutcome = serde_json::from_str(
            r#"{"accuracy_score": 0.4, "error_occurred": true, "bypass_reason": "pii"}"#,
        )
        .unwrap();
        assert_eq!(outcome.signals.accuracy_score, Some(0.4));
        assert!(outcome.signals.error_occurred);
        assert_eq!(outcome.bypass_reason.as_deref(), Some("pii"));
    }
}
