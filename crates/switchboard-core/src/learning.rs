//! Outcome bookkeeping: what ran, whether it worked, how long it took.

use crate::types::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub execution_id: Uuid,
    pub signal_type: String,
    pub source: String,
    pub priority: Priority,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// External pattern memory; receives every outcome, fire-and-forget.
pub trait PatternMemory: Send + Sync {
    fn record_outcome(&self, record: &OutcomeRecord);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalTypeStats {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SignalTypeStats {
    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.successes as f64 / self.executions as f64
    }

    pub fn mean_duration(&self) -> Duration {
        if self.executions == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.total_duration_ms / self.executions)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_executions: u64,
    pub total_successes: u64,
    pub by_signal_type: BTreeMap<String, SignalTypeStats>,
    pub by_priority: BTreeMap<Priority, SignalTypeStats>,
}

impl LearningStats {
    pub fn record(&mut self, outcome: &OutcomeRecord) {
        self.total_executions += 1;
        if outcome.success {
            self.total_successes += 1;
        }
        apply(
            self.by_signal_type
                .entry(outcome.signal_type.clone())
                .or_default(),
            outcome,
        );
        apply(self.by_priority.entry(outcome.priority).or_default(), outcome);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.total_successes as f64 / self.total_executions as f64
    }

    pub fn for_type(&self, signal_type: &str) -> Option<&SignalTypeStats> {
        self.by_signal_type.get(signal_type)
    }
}

fn apply(stats: &mut SignalTypeStats, outcome: &OutcomeRecord) {
    stats.executions += 1;
    stats.total_duration_ms += outcome.duration_ms;
    if outcome.success {
        stats.successes += 1;
    } else {
        stats.failures += 1;
        stats.last_error = outcome.error.clone();
    }
}
