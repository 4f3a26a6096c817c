//! Signals and the decisions the gate hands back for them.
//!
//! The built-in priority table covers the signal vocabulary the producers
//! emit today. Unknown types fall back to `Priority::P3`; deployments can
//! extend or override the table through `priorities.overrides` in config.

use crate::types::{DecisionAction, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Open key/value bag supplied by producers.
pub type Metadata = Map<String, Value>;

// ---------------------------------------------------------------------------
// Priority table
// ---------------------------------------------------------------------------

const PRIORITY_TABLE: &[(&str, Priority)] = &[
    // Critical: credentials, crashes, live audience.
    ("oauth_reauth", Priority::P0),
    ("session_crashed", Priority::P0),
    ("live_stream_started", Priority::P0),
    ("rate_limit_exceeded", Priority::P0),
    // High: rotation bookkeeping and comment backlogs.
    ("rotation_complete", Priority::P1),
    ("channel_phase_complete", Priority::P1),
    ("comment_backlog", Priority::P1),
    ("live_stream_ended", Priority::P1),
    // Normal: cross-posting and notifications.
    ("linkedin_notification", Priority::P2),
    ("x_notification", Priority::P2),
    ("social_post_due", Priority::P2),
    ("schedule_upload", Priority::P2),
    // Low: background indexing.
    ("video_indexing", Priority::P3),
    ("transcript_sync", Priority::P3),
    ("metadata_refresh", Priority::P3),
    // Idle: housekeeping.
    ("breadcrumb_purge", Priority::P4),
    ("pattern_review", Priority::P4),
    ("idle_maintenance", Priority::P4),
];

/// Look up the built-in tier for a signal type, if it is in the table.
pub fn known_priority(signal_type: &str) -> Option<Priority> {
    PRIORITY_TABLE
        .iter()
        .find(|(t, _)| *t == signal_type)
        .map(|(_, p)| *p)
}

/// Built-in tier for `signal_type`, defaulting to `P3` for unknown types.
pub fn priority_for(signal_type: &str) -> Priority {
    known_priority(signal_type).unwrap_or_default()
}

/// All built-in signal types with their tiers, in table order.
pub fn known_signal_types() -> impl Iterator<Item = (&'static str, Priority)> {
    PRIORITY_TABLE.iter().copied()
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: String,
    pub source: String,
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub execution_id: Uuid,
}

impl Signal {
    pub fn new(
        signal_type: impl Into<String>,
        source: impl Into<String>,
        priority: Priority,
        metadata: Metadata,
    ) -> Self {
        Self {
            signal_type: signal_type.into(),
            source: source.into(),
            priority,
            metadata,
            created_at: Utc::now(),
            execution_id: Uuid::new_v4(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Time spent since construction, clamped at zero.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.created_at).max(chrono::Duration::zero())
    }
}

// ---------------------------------------------------------------------------
// SwitchboardDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchboardDecision {
    pub action: DecisionAction,
    pub signal: Signal,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_resource: Option<String>,
    /// 1-based position in the wait queue; only set for `Hold`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Metadata,
}

impl SwitchboardDecision {
    pub fn new(action: DecisionAction, signal: Signal, reason: impl Into<String>) -> Self {
        Self {
            action,
            signal,
            reason: reason.into(),
            recommended_resource: None,
            queue_position: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_resource(mut self, resource: Option<String>) -> Self {
        self.recommended_resource = resource;
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.queue_position = Some(position);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn should_execute(&self) -> bool {
        self.action == DecisionAction::Execute
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookup_and_default() {
        assert_eq!(priority_for("oauth_reauth"), Priority::P0);
        assert_eq!(priority_for("rotation_complete"), Priority::P1);
        assert_eq!(priority_for("linkedin_notification"), Priority::P2);
        assert_eq!(priority_for("video_indexing"), Priority::P3);
        assert_eq!(priority_for("breadcrumb_purge"), Priority::P4);
        assert_eq!(priority_for("never_heard_of_it"), Priority::P3);
        assert_eq!(known_priority("never_heard_of_it"), None);
    }

    #[test]
    fn table_has_no_duplicate_types() {
        let mut types: Vec<&str> = known_signal_types().map(|(t, _)| t).collect();
        let before = types.len();
        types.sort_unstable();
        types.dedup();
        assert_eq!(types.len(), before);
    }

    #[test]
    fn each_signal_gets_a_fresh_execution_id() {
        let a = Signal::new("video_indexing", "indexer", Priority::P3, Metadata::new());
        let b = Signal::new("video_indexing", "indexer", Priority::P3, Metadata::new());
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[test]
    fn decision_json_omits_empty_fields() {
        let signal = Signal::new("x_notification", "x", Priority::P2, Metadata::new());
        let decision = SwitchboardDecision::new(DecisionAction::Execute, signal, "tier free");
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["action"], "EXECUTE");
        assert!(json.get("queue_position").is_none());
        assert!(json.get("metadata").is_none());
    }
}
