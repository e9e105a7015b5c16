//! Structural edits around the active goal.
//!
//! Edits rewrite parent/child indices in the arena. Resolved siblings are
//! never touched, so the single-active-leaf and ordering rules of the
//! combinators still hold afterwards.

use tracing::debug;

use crate::core::budget::{Budget, finite};
use crate::core::goal::{GoalStructure, GoalsCombinator};
use crate::core::goal_tree::{GoalEntry, GoalId, GoalKind, GoalTree};
use crate::error::GoalTreeError;

impl<S, P> GoalTree<S, P> {
    /// Insert `goal` right after `current`.
    ///
    /// Under a SEQ parent the goal becomes the next sibling. Under any other
    /// parent `current` is first wrapped in `SEQ(current, goal)`.
    pub fn add_after(
        &mut self,
        current: GoalId,
        goal: GoalStructure<S, P>,
    ) -> Result<GoalId, GoalTreeError> {
        let parent = self.editable_parent(current)?;
        let inserted = self.graft(goal, Some(parent))?;
        if self.combinator(parent) == Some(GoalsCombinator::Seq) {
            let position = self.position_in_parent(parent, current)?;
            self.children_mut(parent).insert(position + 1, inserted);
        } else {
            let available = self.entry(parent).budget.remaining();
            let wrapper = self.wrap(
                current,
                GoalsCombinator::Seq,
                vec![current, inserted],
                available,
            )?;
            self.entry_mut(inserted).parent = Some(wrapper);
        }
        debug!(goal = %self.label(inserted), after = %self.label(current), "goal inserted");
        Ok(inserted)
    }

    /// Insert `goal` right before `current`, so it is solved first.
    ///
    /// `current` is wrapped in `REPEAT(SEQ(goal, current))`, so a failure of
    /// `current` retries the pair instead of failing the tree. Nothing is
    /// inserted if an isomorphic goal already sits right before `current`
    /// under a SEQ; its id is returned instead.
    pub fn add_before(
        &mut self,
        current: GoalId,
        goal: GoalStructure<S, P>,
    ) -> Result<GoalId, GoalTreeError> {
        let parent = self.editable_parent(current)?;
        if self.combinator(parent) == Some(GoalsCombinator::Seq) {
            let position = self.position_in_parent(parent, current)?;
            if position > 0 {
                let previous = self.children(parent)[position - 1];
                if self.is_isomorphic(previous, &goal) {
                    debug!(goal = %self.label(previous), "goal already precedes the current goal");
                    return Ok(previous);
                }
            }
        }

        let available = self.entry(parent).budget.remaining();
        let inserted = self.graft(goal, None)?;
        let repeat = self.wrap(current, GoalsCombinator::Repeat, Vec::new(), available)?;
        if let Some(cap) = finite(available).and_then(Budget::capped) {
            let entry = self.entry_mut(repeat);
            entry.budget = cap;
            entry.budget.allocate(available);
        }
        let mut sequence =
            GoalEntry::combinator(GoalsCombinator::Seq, vec![inserted, current], Budget::default());
        sequence.parent = Some(repeat);
        sequence.adopted = true;
        sequence.budget.set_remaining(available);
        let sequence = self.push(sequence);
        self.children_mut(repeat).push(sequence);
        self.entry_mut(inserted).parent = Some(sequence);
        self.entry_mut(current).parent = Some(sequence);

        debug!(goal = %self.label(inserted), before = %self.label(current), "goal inserted");
        Ok(inserted)
    }

    /// Detach an unresolved subtree.
    ///
    /// Parents left without children are detached as well. The goal `current`
    /// works on, and its ancestors, cannot be removed, nor can the last child
    /// of the root. Returns the topmost node that was detached.
    pub fn remove(
        &mut self,
        current: Option<GoalId>,
        goal: GoalId,
    ) -> Result<GoalId, GoalTreeError> {
        if !self.is_live(goal) {
            return Err(GoalTreeError::UnknownGoal(goal.index()));
        }
        let required = goal == self.root
            || current.is_some_and(|active| self.is_descendant_of(active, goal));
        if required {
            return Err(GoalTreeError::RequiredAncestor {
                goal: self.label(goal).to_string(),
            });
        }
        if self.status(goal).is_terminal() {
            return Err(GoalTreeError::AlreadyConcluded {
                goal: self.label(goal).to_string(),
            });
        }

        let mut detached = goal;
        let parent = loop {
            let parent = self
                .parent(detached)
                .ok_or(GoalTreeError::UnknownGoal(detached.index()))?;
            if self.children(parent).len() > 1 {
                break parent;
            }
            if parent == self.root {
                return Err(GoalTreeError::ChildlessRoot {
                    goal: self.label(goal).to_string(),
                });
            }
            detached = parent;
        };
        self.children_mut(parent).retain(|child| *child != detached);
        self.entry_mut(detached).parent = None;
        debug!(goal = %self.label(goal), detached = %self.label(detached), "goal removed");
        Ok(detached)
    }

    fn editable_parent(&self, current: GoalId) -> Result<GoalId, GoalTreeError> {
        if !self.is_live(current) {
            return Err(GoalTreeError::UnknownGoal(current.index()));
        }
        self.parent(current).ok_or(GoalTreeError::SingletonTree)
    }

    fn position_in_parent(&self, parent: GoalId, child: GoalId) -> Result<usize, GoalTreeError> {
        self.children(parent)
            .iter()
            .position(|id| *id == child)
            .ok_or(GoalTreeError::UnknownGoal(child.index()))
    }

    fn children_mut(&mut self, id: GoalId) -> &mut Vec<GoalId> {
        match &mut self.entry_mut(id).kind {
            GoalKind::Combinator { children, .. } => children,
            GoalKind::Leaf(_) => unreachable!("leaves have no children"),
        }
    }

    /// Put a new combinator in `node`'s slot under its parent and make `node`
    /// its child. The wrapper is already on the active path.
    fn wrap(
        &mut self,
        node: GoalId,
        kind: GoalsCombinator,
        children: Vec<GoalId>,
        available: f64,
    ) -> Result<GoalId, GoalTreeError> {
        let parent = self.editable_parent(node)?;
        let position = self.position_in_parent(parent, node)?;
        let mut entry = GoalEntry::combinator(kind, children, Budget::default());
        entry.parent = Some(parent);
        entry.adopted = true;
        entry.budget.set_remaining(available);
        let wrapper = self.push(entry);
        self.children_mut(parent)[position] = wrapper;
        self.entry_mut(node).parent = Some(wrapper);
        Ok(wrapper)
    }
}
