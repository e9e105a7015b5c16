//! Arena-backed goal tree: structure, status and budget bookkeeping.
//!
//! Nodes are addressed by [`GoalId`] handles that stay valid across edits.
//! Detached subtrees keep their slots but are unreachable from the root.
//! Selection of the active leaf lives in [`crate::core::selector`] and
//! structural edits in [`crate::core::editing`].

use std::fmt;
use std::time::Duration;

use tracing::warn;

use crate::core::budget::{Budget, is_valid_amount};
use crate::core::goal::{GoalNode, GoalShape, GoalStructure, GoalsCombinator};
use crate::core::status::{FailureReason, ProgressStatus};
use crate::error::GoalTreeError;

/// Stable handle of a node inside a [`GoalTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalId(pub(super) usize);

impl GoalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(super) enum GoalKind<S, P> {
    Leaf(Box<GoalNode<S, P>>),
    Combinator {
        kind: GoalsCombinator,
        children: Vec<GoalId>,
    },
}

pub(super) struct GoalEntry<S, P> {
    pub(super) kind: GoalKind<S, P>,
    pub(super) parent: Option<GoalId>,
    pub(super) budget: Budget,
    /// Set once the node joined the active path and received its allocation.
    pub(super) adopted: bool,
    /// Failure imposed on an internal node (exhaustion, stop, explicit fail).
    pub(super) forced: Option<FailureReason>,
    pub(super) used_time: Duration,
}

impl<S, P> GoalEntry<S, P> {
    pub(super) fn combinator(kind: GoalsCombinator, children: Vec<GoalId>, budget: Budget) -> Self {
        Self {
            kind: GoalKind::Combinator { kind, children },
            parent: None,
            budget,
            adopted: false,
            forced: None,
            used_time: Duration::ZERO,
        }
    }
}

/// A goal tree owned by one agent.
pub struct GoalTree<S, P> {
    pub(super) entries: Vec<GoalEntry<S, P>>,
    pub(super) root: GoalId,
}

impl<S, P> fmt::Debug for GoalTree<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalTree")
            .field("root", &self.label(self.root))
            .field("nodes", &self.entries.len())
            .field("status", &self.status(self.root))
            .finish()
    }
}

impl<S, P> GoalTree<S, P> {
    /// Validate and flatten a goal structure.
    ///
    /// Rejects empty combinators, REPEAT nodes without exactly one child,
    /// invalid budget caps, leaves without a tactic, empty tactic combinators
    /// and test goals lacking an oracle.
    pub fn new(structure: GoalStructure<S, P>) -> Result<Self, GoalTreeError> {
        let mut tree = Self {
            entries: Vec::new(),
            root: GoalId(0),
        };
        tree.root = tree.graft(structure, None)?;
        Ok(tree)
    }

    /// Flatten `structure` into the arena below `parent`. The caller links the
    /// returned node into the parent's child list.
    pub(super) fn graft(
        &mut self,
        structure: GoalStructure<S, P>,
        parent: Option<GoalId>,
    ) -> Result<GoalId, GoalTreeError> {
        validate_structure(&structure)?;
        Ok(self.flatten(structure, parent))
    }

    fn flatten(&mut self, structure: GoalStructure<S, P>, parent: Option<GoalId>) -> GoalId {
        let budget = structure
            .max_budget
            .and_then(Budget::capped)
            .unwrap_or_default();
        let id = GoalId(self.entries.len());
        match structure.shape {
            GoalShape::Primitive(goal) => self.entries.push(GoalEntry {
                kind: GoalKind::Leaf(goal),
                parent,
                budget,
                adopted: false,
                forced: None,
                used_time: Duration::ZERO,
            }),
            GoalShape::Combinator(kind, substructures) => {
                let mut entry = GoalEntry::combinator(kind, Vec::new(), budget);
                entry.parent = parent;
                self.entries.push(entry);
                let ids: Vec<GoalId> = substructures
                    .into_iter()
                    .map(|sub| self.flatten(sub, Some(id)))
                    .collect();
                if let GoalKind::Combinator { children, .. } = &mut self.entries[id.0].kind {
                    *children = ids;
                }
            }
        }
        id
    }

    pub fn root(&self) -> GoalId {
        self.root
    }

    pub(super) fn entry(&self, id: GoalId) -> &GoalEntry<S, P> {
        &self.entries[id.0]
    }

    pub(super) fn entry_mut(&mut self, id: GoalId) -> &mut GoalEntry<S, P> {
        &mut self.entries[id.0]
    }

    pub(super) fn push(&mut self, entry: GoalEntry<S, P>) -> GoalId {
        self.entries.push(entry);
        GoalId(self.entries.len() - 1)
    }

    /// Leaf goal behind `id`, `None` for combinators and unknown ids.
    pub fn goal(&self, id: GoalId) -> Option<&GoalNode<S, P>> {
        match &self.entries.get(id.0)?.kind {
            GoalKind::Leaf(goal) => Some(goal),
            GoalKind::Combinator { .. } => None,
        }
    }

    pub(crate) fn goal_mut(&mut self, id: GoalId) -> Option<&mut GoalNode<S, P>> {
        match &mut self.entries.get_mut(id.0)?.kind {
            GoalKind::Leaf(goal) => Some(goal),
            GoalKind::Combinator { .. } => None,
        }
    }

    pub fn combinator(&self, id: GoalId) -> Option<GoalsCombinator> {
        match &self.entries.get(id.0)?.kind {
            GoalKind::Leaf(_) => None,
            GoalKind::Combinator { kind, .. } => Some(*kind),
        }
    }

    pub fn children(&self, id: GoalId) -> &[GoalId] {
        match self.entries.get(id.0).map(|entry| &entry.kind) {
            Some(GoalKind::Combinator { children, .. }) => children,
            _ => &[],
        }
    }

    pub fn parent(&self, id: GoalId) -> Option<GoalId> {
        self.entries.get(id.0)?.parent
    }

    pub fn budget(&self, id: GoalId) -> Option<&Budget> {
        self.entries.get(id.0).map(|entry| &entry.budget)
    }

    /// Time spent in actions executed under this node.
    pub fn used_time(&self, id: GoalId) -> Duration {
        self.entries
            .get(id.0)
            .map_or(Duration::ZERO, |entry| entry.used_time)
    }

    /// Goal name for leaves, combinator label otherwise.
    pub fn label(&self, id: GoalId) -> &str {
        match self.entries.get(id.0).map(|entry| &entry.kind) {
            Some(GoalKind::Leaf(goal)) => goal.name(),
            Some(GoalKind::Combinator { kind, .. }) => kind.label(),
            None => "?",
        }
    }

    /// True when `id` is reachable from the root.
    pub fn is_live(&self, id: GoalId) -> bool {
        id.0 < self.entries.len() && self.ancestors(id).last() == Some(self.root)
    }

    /// `id` followed by its parents up to the top of its subtree.
    pub fn ancestors(&self, id: GoalId) -> impl Iterator<Item = GoalId> + '_ {
        std::iter::successors(Some(id), move |current| self.entries[current.0].parent)
    }

    /// True when `ancestor` lies on the path from `id` to the root (inclusive).
    pub fn is_descendant_of(&self, id: GoalId, ancestor: GoalId) -> bool {
        self.ancestors(id).any(|node| node == ancestor)
    }

    /// Live nodes in depth-first, left-to-right order.
    pub fn preorder(&self) -> Vec<GoalId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        order
    }

    /// Live leaves, left to right.
    pub fn leaves(&self) -> impl Iterator<Item = (GoalId, &GoalNode<S, P>)> + '_ {
        self.preorder()
            .into_iter()
            .filter_map(move |id| self.goal(id).map(|goal| (id, goal)))
    }

    /// First live leaf with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<GoalId> {
        self.leaves()
            .find(|(_, goal)| goal.name() == name)
            .map(|(id, _)| id)
    }

    /// Leaves that will hand a verdict to a data collector.
    pub fn oracle_goals(&self) -> impl Iterator<Item = &GoalNode<S, P>> + '_ {
        self.leaves()
            .map(|(_, goal)| goal)
            .filter(|goal| goal.has_oracle())
    }

    /// Status computed from the leaves and the combinators on read.
    ///
    /// A forced failure wins. Otherwise SEQ fails when any child failed and
    /// succeeds when all did, FIRSTOF succeeds when any child succeeded and
    /// fails when all did, and REPEAT only ever reports its child's success.
    pub fn status(&self, id: GoalId) -> ProgressStatus {
        let Some(entry) = self.entries.get(id.0) else {
            return ProgressStatus::InProgress;
        };
        if entry.forced.is_some() {
            return ProgressStatus::Failed;
        }
        match &entry.kind {
            GoalKind::Leaf(goal) => goal.status(),
            GoalKind::Combinator { kind, children } => {
                let mut statuses = children.iter().map(|child| self.status(*child));
                match kind {
                    GoalsCombinator::Seq => {
                        let statuses: Vec<ProgressStatus> = statuses.collect();
                        if statuses.iter().any(|s| s.failed()) {
                            ProgressStatus::Failed
                        } else if statuses.iter().all(|s| s.success()) {
                            ProgressStatus::Success
                        } else {
                            ProgressStatus::InProgress
                        }
                    }
                    GoalsCombinator::FirstOf => {
                        let statuses: Vec<ProgressStatus> = statuses.collect();
                        if statuses.iter().any(|s| s.success()) {
                            ProgressStatus::Success
                        } else if statuses.iter().all(|s| s.failed()) {
                            ProgressStatus::Failed
                        } else {
                            ProgressStatus::InProgress
                        }
                    }
                    GoalsCombinator::Repeat => {
                        if statuses.any(ProgressStatus::success) {
                            ProgressStatus::Success
                        } else {
                            ProgressStatus::InProgress
                        }
                    }
                }
            }
        }
    }

    pub fn is_concluded(&self) -> bool {
        self.status(self.root).is_terminal()
    }

    /// Why `id` failed, if it did: the forced reason, the leaf's own reason,
    /// or the reason of the child that made the combinator fail.
    pub fn failure_reason(&self, id: GoalId) -> Option<&FailureReason> {
        let entry = self.entries.get(id.0)?;
        if let Some(reason) = &entry.forced {
            return Some(reason);
        }
        match &entry.kind {
            GoalKind::Leaf(goal) => goal.failure(),
            GoalKind::Combinator { kind, children } => {
                if !self.status(id).failed() {
                    return None;
                }
                let culprit = match kind {
                    GoalsCombinator::FirstOf => children.last(),
                    _ => children.iter().find(|child| self.status(**child).failed()),
                };
                culprit.and_then(|child| self.failure_reason(*child))
            }
        }
    }

    /// Set the budget handed to the root, capped by its own max budget.
    pub fn allocate_initial_budget(&mut self, budget: f64) -> Result<(), GoalTreeError> {
        if !is_valid_amount(budget) {
            return Err(GoalTreeError::InvalidInitialBudget(budget));
        }
        let root = self.root;
        self.adopt(root, budget);
        Ok(())
    }

    /// Give `id` its share of its parent's remaining budget.
    pub(super) fn adopt(&mut self, id: GoalId, parent_remaining: f64) {
        let entry = &mut self.entries[id.0];
        entry.budget.allocate(parent_remaining);
        entry.adopted = true;
        if let GoalKind::Leaf(goal) = &mut entry.kind {
            if let Some(tactic) = goal.tactic_mut() {
                tactic.reset();
            }
        }
    }

    /// Subtract `amount` from `leaf` and every ancestor, then force FAILED on
    /// any of them that is still open with nothing left.
    ///
    /// Returns the nodes that became exhausted, bottom-up.
    pub fn register_consumed_budget(&mut self, leaf: GoalId, amount: f64) -> Vec<GoalId> {
        let path: Vec<GoalId> = self.ancestors(leaf).collect();
        for id in &path {
            self.entries[id.0].budget.consume(amount);
        }
        let mut exhausted = Vec::new();
        for id in path {
            if self.entries[id.0].budget.is_exhausted() && self.status(id).in_progress() {
                warn!(
                    goal = %self.label(id),
                    node = %id,
                    reason = %FailureReason::BudgetExhausted,
                    "goal failed"
                );
                self.fail(id, FailureReason::BudgetExhausted);
                exhausted.push(id);
            }
        }
        exhausted
    }

    /// Attribute action runtime to `leaf` and its ancestors.
    pub fn register_used_time(&mut self, leaf: GoalId, elapsed: Duration) {
        let path: Vec<GoalId> = self.ancestors(leaf).collect();
        for id in path {
            self.entries[id.0].used_time += elapsed;
        }
    }

    /// Force `id` to FAILED with `reason`.
    pub fn fail(&mut self, id: GoalId, reason: FailureReason) {
        let Some(entry) = self.entries.get_mut(id.0) else {
            return;
        };
        match &mut entry.kind {
            GoalKind::Leaf(goal) => goal.set_failed(reason),
            GoalKind::Combinator { .. } => entry.forced = Some(reason),
        }
    }

    /// Mark a leaf solved without a proposal.
    pub fn succeed(&mut self, id: GoalId, info: impl Into<String>) {
        if let Some(goal) = self.goal_mut(id) {
            goal.set_success(info);
        }
    }

    /// Structural comparison against a builder: same combinators in the same
    /// places and leaves with the same names.
    pub fn is_isomorphic(&self, id: GoalId, other: &GoalStructure<S, P>) -> bool {
        match (&self.entries[id.0].kind, other.shape()) {
            (GoalKind::Leaf(goal), GoalShape::Primitive(candidate)) => {
                goal.name() == candidate.name()
            }
            (
                GoalKind::Combinator { kind, children },
                GoalShape::Combinator(other_kind, other_children),
            ) => {
                kind == other_kind
                    && children.len() == other_children.len()
                    && children
                        .iter()
                        .zip(other_children)
                        .all(|(child, other_child)| self.is_isomorphic(*child, other_child))
            }
            _ => false,
        }
    }
}

fn validate_structure<S, P>(structure: &GoalStructure<S, P>) -> Result<(), GoalTreeError> {
    if let Some(max) = structure.max_budget {
        if !is_valid_amount(max) {
            return Err(GoalTreeError::InvalidMaxBudget {
                goal: structure.label().to_string(),
                value: max,
            });
        }
    }
    match structure.shape() {
        GoalShape::Primitive(goal) => {
            let tactic = goal.tactic().ok_or_else(|| GoalTreeError::MissingTactic {
                goal: goal.name().to_string(),
            })?;
            tactic.validate(goal.name())?;
            if goal.requires_oracle() && !goal.has_oracle() {
                return Err(GoalTreeError::MissingOracle {
                    goal: goal.name().to_string(),
                });
            }
            Ok(())
        }
        GoalShape::Combinator(kind, children) => {
            if children.is_empty() {
                return Err(GoalTreeError::EmptyCombinator {
                    combinator: kind.label(),
                });
            }
            if *kind == GoalsCombinator::Repeat && children.len() != 1 {
                return Err(GoalTreeError::RepeatArity {
                    found: children.len(),
                });
            }
            children.iter().try_for_each(validate_structure)
        }
    }
}
