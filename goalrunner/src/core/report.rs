//! Serializable snapshots of a goal tree for post-mortem inspection.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::budget::finite;
use crate::core::goal_tree::{GoalId, GoalTree};
use crate::core::status::{FailureReason, ProgressStatus};

/// Snapshot of one node and, recursively, its children.
///
/// Budgets are `None` when unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalReport {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combinator: Option<String>,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub max_budget: Option<f64>,
    pub remaining_budget: Option<f64>,
    pub consumed_budget: f64,
    pub used_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GoalReport>,
}

impl GoalReport {
    /// Depth-first search for the first node with the given label.
    pub fn find(&self, label: &str) -> Option<&GoalReport> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(label))
    }
}

impl<S, P> GoalTree<S, P> {
    pub fn report(&self) -> GoalReport {
        self.report_node(self.root())
    }

    fn report_node(&self, id: GoalId) -> GoalReport {
        let budget = self.budget(id).copied().unwrap_or_default();
        GoalReport {
            label: self.label(id).to_string(),
            combinator: self.combinator(id).map(|kind| kind.label().to_string()),
            status: self.status(id),
            failure: self.failure_reason(id).cloned(),
            distance: self.goal(id).and_then(|goal| goal.distance()),
            max_budget: finite(budget.max()),
            remaining_budget: finite(budget.remaining()),
            consumed_budget: budget.consumed(),
            used_time_ms: u64::try_from(self.used_time(id).as_millis()).unwrap_or(u64::MAX),
            children: self
                .children(id)
                .iter()
                .map(|child| self.report_node(*child))
                .collect(),
        }
    }

    /// Indented, one node per line: label, status and budget.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.summary_node(self.root(), 0, &mut out);
        out
    }

    fn summary_node(&self, id: GoalId, depth: usize, out: &mut String) {
        let budget = self.budget(id).copied().unwrap_or_default();
        let _ = write!(
            out,
            "{:indent$}{} [{}] consumed={}",
            "",
            self.label(id),
            self.status(id),
            budget.consumed(),
            indent = depth * 2
        );
        if let Some(remaining) = finite(budget.remaining()) {
            let _ = write!(out, " remaining={remaining}");
        }
        if let Some(reason) = self.failure_reason(id) {
            let _ = write!(out, " ({reason})");
        }
        out.push('\n');
        for child in self.children(id) {
            self.summary_node(*child, depth + 1, out);
        }
    }

    /// Compact structural form, e.g. `SEQ(a, FIRSTOF(b, c))`.
    pub fn outline(&self) -> String {
        self.outline_node(self.root())
    }

    fn outline_node(&self, id: GoalId) -> String {
        let children = self.children(id);
        if self.combinator(id).is_none() {
            return self.label(id).to_string();
        }
        let inner: Vec<String> = children
            .iter()
            .map(|child| self.outline_node(*child))
            .collect();
        format!("{}({})", self.label(id), inner.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::goal::{GoalNode, GoalStructure, GoalsCombinator};
    use crate::core::tactic::Action;

    fn tree() -> GoalTree<(), i32> {
        GoalTree::new(GoalStructure::combinator(
            GoalsCombinator::Seq,
            vec![
                GoalNode::new("a")
                    .to_solve(|p: &i32| *p == 1)
                    .with_tactic(Action::new("noop").lift())
                    .maxbudget(4.0),
                GoalNode::new("b")
                    .with_tactic(Action::new("noop").lift())
                    .lift(),
            ],
        ))
        .expect("tree")
    }

    #[test]
    fn report_captures_failure_and_budgets() {
        let mut tree = tree();
        let a = tree.find_active_goal().expect("a");
        tree.register_consumed_budget(a, 4.0);

        let report = tree.report();
        assert_eq!(report.status, ProgressStatus::Failed);
        assert_eq!(report.combinator.as_deref(), Some("SEQ"));
        assert_eq!(report.failure, Some(FailureReason::BudgetExhausted));
        assert_eq!(report.remaining_budget, None);
        assert_eq!(report.consumed_budget, 4.0);

        let a = report.find("a").expect("a");
        assert_eq!(a.max_budget, Some(4.0));
        assert_eq!(a.remaining_budget, Some(0.0));
        let b = report.find("b").expect("b");
        assert_eq!(b.status, ProgressStatus::InProgress);
        assert_eq!(b.consumed_budget, 0.0);

        let json = serde_json::to_string(&report).expect("serialize");
        let back: GoalReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }

    #[test]
    fn summary_indents_children() {
        let tree = tree();
        let summary = tree.summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SEQ [in_progress]"));
        assert!(lines[1].starts_with("  a [in_progress]"));
        assert_eq!(tree.outline(), "SEQ(a, b)");
    }
}
