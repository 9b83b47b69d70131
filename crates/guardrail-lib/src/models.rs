//! Core data models for the guardrail monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality signals reported by the caller for one processed request
///
/// Optional scores that are absent were not evaluated this round (the judge
/// is sampled upstream) and are never treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualitySignals {
    /// Independent factual-accuracy judgment in [0, 1]
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    /// Primary policy score: how well the response is grounded in its source
    #[serde(default, alias = "primary_policy_score")]
    pub grounding_score: Option<f64>,
    /// Secondary policy score: how well the response addresses the query
    #[serde(default, alias = "secondary_policy_score")]
    pub relevance_score: Option<f64>,
    /// True if the upstream call pipeline failed
    #[serde(default)]
    pub error_occurred: bool,
    /// End-to-end response time in seconds
    #[serde(default)]
    pub response_time: Option<f64>,
}

impl QualitySignals {
    pub fn with_accuracy(mut self, score: f64) -> Self {
        self.accuracy_score = Some(score);
        self
    }

    pub fn with_grounding(mut self, score: f64) -> Self {
        self.grounding_score = Some(score);
        self
    }

    pub fn with_relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time = Some(seconds);
        self
    }

    pub fn failed(mut self) -> Self {
        self.error_occurred = true;
        self
    }
}

/// One timestamped observation held by the metrics store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    #[serde(flatten)]
    pub signals: QualitySignals,
    /// Assigned once at insertion
    pub timestamp: DateTime<Utc>,
}

impl QualitySample {
    pub fn new(signals: QualitySignals, timestamp: DateTime<Utc>) -> Self {
        Self { signals, timestamp }
    }
}

/// Coarse ranking of a detected violation, for display only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single threshold violation found in a sample
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    SystemError,
    CriticalAccuracy(f64),
    LowAccuracy(f64),
    HighResponseTime(f64),
}

impl Violation {
    /// Critical tags force the overall severity to CRITICAL
    pub fn is_critical(&self) -> bool {
        matches!(self, Violation::SystemError | Violation::CriticalAccuracy(_))
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::SystemError => write!(f, "System error occurred"),
            Violation::CriticalAccuracy(score) => write!(f, "CRITICAL accuracy: {:.3}", score),
            Violation::LowAccuracy(score) => write!(f, "Low accuracy: {:.3}", score),
            Violation::HighResponseTime(secs) => write!(f, "High response time: {:.2}s", secs),
        }
    }
}

/// The last violation detection, kept for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub severity: Severity,
    pub violations: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

/// Enforcement recommendation from the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableDecision {
    pub should_disable: bool,
    pub reason: String,
}

impl DisableDecision {
    pub fn disable(reason: impl Into<String>) -> Self {
        Self {
            should_disable: true,
            reason: reason.into(),
        }
    }

    pub fn keep(reason: impl Into<String>) -> Self {
        Self {
            should_disable: false,
            reason: reason.into(),
        }
    }
}
