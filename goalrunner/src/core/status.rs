//! Progress status shared by goals, goal trees, and agents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rough status of a goal or goal-tree node.
///
/// `Success` and `Failed` are terminal: once a node reaches either, only a
/// REPEAT re-arm can bring it back to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Success,
    Failed,
}

impl ProgressStatus {
    pub fn in_progress(self) -> bool {
        self == Self::InProgress
    }

    pub fn success(self) -> bool {
        self == Self::Success
    }

    pub fn failed(self) -> bool {
        self == Self::Failed
    }

    /// True once the status can no longer change on its own.
    pub fn is_terminal(self) -> bool {
        !self.in_progress()
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Why a node ended up `Failed`.
///
/// Budget exhaustion propagates exactly like any other failure but stays
/// distinguishable from a semantic one in reports and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The ABORT action was chosen.
    Aborted,
    /// Remaining budget dropped to zero while the node was still open.
    BudgetExhausted,
    /// The autonomous loop was stopped while the tree was open.
    Stopped,
    /// Failed explicitly from outside the execution cycle.
    Explicit(String),
}

impl FailureReason {
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted => f.write_str("abort was invoked"),
            Self::BudgetExhausted => f.write_str("budget exhausted"),
            Self::Stopped => f.write_str("agent stopped"),
            Self::Explicit(reason) => f.write_str(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ProgressStatus::InProgress.is_terminal());
        assert!(ProgressStatus::Success.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
    }

    #[test]
    fn failure_reason_serializes_with_tag() {
        let json = serde_json::to_string(&FailureReason::Explicit("gave up".to_string()))
            .expect("serialize");
        assert_eq!(json, r#"{"kind":"explicit","detail":"gave up"}"#);
        let json = serde_json::to_string(&FailureReason::BudgetExhausted).expect("serialize");
        assert_eq!(json, r#"{"kind":"budget_exhausted"}"#);
    }
}
