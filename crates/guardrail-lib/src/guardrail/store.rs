//! Time-bounded ledger of quality samples
//!
//! Samples are appended in arrival order, which is also time order since
//! timestamps come from the store's clock at insertion. Anything older than
//! twice the evaluation window is pruned on every insert.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{cutoff_before, Clock};
use crate::models::{QualitySample, QualitySignals};

/// Aggregate statistics over one window
///
/// Score means and minimums only consider samples where that score is
/// present; absent scores are excluded from numerator and denominator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_minutes: f64,
    pub total_requests: usize,
    pub error_count: usize,
    pub error_rate: f64,
    pub avg_accuracy: Option<f64>,
    pub avg_grounding: Option<f64>,
    pub avg_relevance: Option<f64>,
    pub min_accuracy: Option<f64>,
    pub min_grounding: Option<f64>,
    pub min_relevance: Option<f64>,
}

/// Window summary; an empty window is reported distinctly from a healthy one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowSummary {
    NoRecentData,
    Active(WindowStats),
}

impl WindowSummary {
    pub fn stats(&self) -> Option<&WindowStats> {
        match self {
            WindowSummary::NoRecentData => None,
            WindowSummary::Active(stats) => Some(stats),
        }
    }
}

/// Append-only, time-bounded store of quality samples
pub struct MetricsStore {
    samples: VecDeque<QualitySample>,
    retention_minutes: f64,
    clock: Arc<dyn Clock>,
}

impl MetricsStore {
    /// Create a store that keeps samples for `retention_minutes`
    pub fn new(retention_minutes: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            samples: VecDeque::new(),
            retention_minutes,
            clock,
        }
    }

    /// Drop expired samples, then stamp and append the new one
    ///
    /// The new sample is never pruned, even when retention is not positive.
    pub fn add(&mut self, signals: QualitySignals) -> QualitySample {
        let now = self.clock.now();
        self.prune(now);
        let sample = QualitySample::new(signals, now);
        self.samples.push_back(sample.clone());
        sample
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        // A cutoff before chrono's minimum keeps everything
        let Some(cutoff) = cutoff_before(now, self.retention_minutes) else {
            return;
        };
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Samples no older than `window_minutes`, oldest first
    pub fn recent(&self, window_minutes: f64) -> Vec<&QualitySample> {
        match cutoff_before(self.clock.now(), window_minutes) {
            Some(cutoff) => self
                .samples
                .iter()
                .filter(|sample| sample.timestamp >= cutoff)
                .collect(),
            None => self.samples.iter().collect(),
        }
    }

    /// Aggregate snapshot of the last `window_minutes`
    pub fn summary(&self, window_minutes: f64) -> WindowSummary {
        let recent = self.recent(window_minutes);
        if recent.is_empty() {
            return WindowSummary::NoRecentData;
        }

        let total = recent.len();
        let error_count = recent.iter().filter(|s| s.signals.error_occurred).count();

        let accuracy = present(&recent, |s| s.signals.accuracy_score);
        let grounding = present(&recent, |s| s.signals.grounding_score);
        let relevance = present(&recent, |s| s.signals.relevance_score);

        WindowSummary::Active(WindowStats {
            window_minutes,
            total_requests: total,
            error_count,
            error_rate: error_count as f64 / total as f64,
            avg_accuracy: mean(&accuracy),
            avg_grounding: mean(&grounding),
            avg_relevance: mean(&relevance),
            min_accuracy: min(&accuracy),
            min_grounding: min(&grounding),
            min_relevance: min(&relevance),
        })
    }

    /// The last `limit` retained samples, oldest first
    pub fn latest(&self, limit: usize) -> Vec<QualitySample> {
        let skip = self.samples.len().saturating_sub(limit);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest retained timestamp, if any
    pub fn oldest(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.samples.front().map(|s| s.timestamp)
    }
}

fn present(samples: &[&QualitySample], field: impl Fn(&QualitySample) -> Option<f64>) -> Vec<f64> {
    samples.iter().filter_map(|s| field(*s)).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn min(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
