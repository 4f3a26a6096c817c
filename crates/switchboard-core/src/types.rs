use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Admission tier. Lower ordinal is more urgent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    P0,
    P1,
    P2,
    #[default]
    P3,
    P4,
}

impl Priority {
    pub fn all() -> &'static [Priority] {
        &[
            Priority::P0,
            Priority::P1,
            Priority::P2,
            Priority::P3,
            Priority::P4,
        ]
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// True when `self` should block `other` from admission.
    pub fn is_more_urgent_than(self, other: Priority) -> bool {
        self < other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::P0 => "p0",
            Priority::P1 => "p1",
            Priority::P2 => "p2",
            Priority::P3 => "p3",
            Priority::P4 => "p4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::P0 => "critical",
            Priority::P1 => "high",
            Priority::P2 => "normal",
            Priority::P3 => "low",
            Priority::P4 => "idle",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::error::SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p0" | "critical" => Ok(Priority::P0),
            "p1" | "high" => Ok(Priority::P1),
            "p2" | "normal" => Ok(Priority::P2),
            "p3" | "low" => Ok(Priority::P3),
            "p4" | "idle" => Ok(Priority::P4),
            _ => Err(crate::error::SwitchboardError::InvalidPriority(
                s.to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Channel phase. The sequence is linear; only a full-rotation reset moves
/// a channel back to `P1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    P1,
    P2,
    P3,
    Complete,
}

impl Phase {
    pub fn all() -> &'static [Phase] {
        &[Phase::P1, Phase::P2, Phase::P3, Phase::Complete]
    }

    /// Phases that produce work items.
    pub fn working() -> &'static [Phase] {
        &[Phase::P1, Phase::P2, Phase::P3]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Phase> {
        Phase::all().get(self.index() + 1).copied()
    }

    pub fn is_complete(self) -> bool {
        self == Phase::Complete
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::P1 => "p1",
            Phase::P2 => "p2",
            Phase::P3 => "p3",
            Phase::Complete => "complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = crate::error::SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p1" => Ok(Phase::P1),
            "p2" => Ok(Phase::P2),
            "p3" => Ok(Phase::P3),
            "complete" => Ok(Phase::Complete),
            _ => Err(crate::error::SwitchboardError::InvalidPhase(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// DecisionAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Execute,
    Hold,
    Escalate,
    Drop,
}

impl DecisionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionAction::Execute => "EXECUTE",
            DecisionAction::Hold => "HOLD",
            DecisionAction::Escalate => "ESCALATE",
            DecisionAction::Drop => "DROP",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
