//! Deterministic selection of the active goal.

use tracing::debug;

use crate::core::goal::GoalsCombinator;
use crate::core::goal_tree::{GoalId, GoalKind, GoalTree};

impl<S, P> GoalTree<S, P> {
    /// Find the leaf the next tick works on, allocating budget to every node
    /// that joins the active path on the way down.
    ///
    /// SEQ descends into its first child not yet succeeded, FIRSTOF into its
    /// first child not yet failed, REPEAT into its only child after re-arming
    /// it if it failed. Returns `None` once the whole tree is concluded.
    pub fn find_active_goal(&mut self) -> Option<GoalId> {
        let root = self.root;
        if !self.entry(root).adopted {
            self.adopt(root, f64::INFINITY);
        }
        if self.status(root).is_terminal() {
            return None;
        }
        let mut current = root;
        loop {
            let next = match &self.entry(current).kind {
                GoalKind::Leaf(_) => return Some(current),
                GoalKind::Combinator { kind, children } => match kind {
                    GoalsCombinator::Seq => children
                        .iter()
                        .copied()
                        .find(|child| !self.status(*child).success())?,
                    GoalsCombinator::FirstOf => children
                        .iter()
                        .copied()
                        .find(|child| !self.status(*child).failed())?,
                    GoalsCombinator::Repeat => *children.first()?,
                },
            };
            if self.combinator(current) == Some(GoalsCombinator::Repeat)
                && self.status(next).failed()
            {
                debug!(goal = %self.label(next), node = %next, "re-arming repeated goal");
                self.rearm(next);
            }
            if !self.entry(next).adopted {
                let available = self.entry(current).budget.remaining();
                self.adopt(next, available);
            }
            current = next;
        }
    }

    /// Whether `id` has already received its budget on the current path.
    pub fn is_adopted(&self, id: GoalId) -> bool {
        self.is_live(id) && self.entry(id).adopted
    }

    /// Bring a subtree back to its initial condition so it can be retried.
    fn rearm(&mut self, id: GoalId) {
        let children = self.children(id).to_vec();
        let entry = self.entry_mut(id);
        entry.adopted = false;
        entry.forced = None;
        if let GoalKind::Leaf(goal) = &mut entry.kind {
            goal.rearm();
        }
        for child in children {
            self.rearm(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::budget::Budget;
    use crate::core::goal::{GoalNode, GoalStructure, GoalsCombinator};
    use crate::core::goal_tree::GoalTree;
    use crate::core::status::{FailureReason, ProgressStatus};
    use crate::core::tactic::Action;

    type Structure = GoalStructure<i32, i32>;

    fn leaf(name: &str) -> Structure {
        GoalNode::new(name)
            .to_solve(|p: &i32| *p > 0)
            .with_tactic(Action::new("noop").lift())
            .lift()
    }

    fn node(kind: GoalsCombinator, children: Vec<Structure>) -> Structure {
        GoalStructure::combinator(kind, children)
    }

    fn remaining(tree: &GoalTree<i32, i32>, name: &str) -> f64 {
        let id = tree.find_by_name(name).expect("goal");
        tree.budget(id).map_or(f64::NAN, Budget::remaining)
    }

    #[test]
    fn seq_selects_leftmost_unsolved_leaf() {
        let mut tree =
            GoalTree::new(node(GoalsCombinator::Seq, vec![leaf("a"), leaf("b")])).expect("tree");
        let a = tree.find_by_name("a").expect("a");
        let b = tree.find_by_name("b").expect("b");
        assert_eq!(tree.find_active_goal(), Some(a));
        tree.succeed(a, "done");
        assert_eq!(tree.find_active_goal(), Some(b));
        tree.succeed(b, "done");
        assert_eq!(tree.find_active_goal(), None);
    }

    #[test]
    fn first_of_skips_failed_children() {
        let mut tree = GoalTree::new(node(GoalsCombinator::FirstOf, vec![leaf("a"), leaf("b")]))
            .expect("tree");
        let a = tree.find_by_name("a").expect("a");
        let b = tree.find_by_name("b").expect("b");
        tree.fail(a, FailureReason::Aborted);
        assert_eq!(tree.find_active_goal(), Some(b));
        tree.fail(b, FailureReason::Aborted);
        assert_eq!(tree.find_active_goal(), None);
        assert_eq!(tree.status(tree.root()), ProgressStatus::Failed);
    }

    #[test]
    fn repeat_rearms_failed_child() {
        let mut tree = GoalTree::new(node(
            GoalsCombinator::Repeat,
            vec![node(GoalsCombinator::Seq, vec![leaf("a"), leaf("b")])],
        ))
        .expect("tree");
        let a = tree.find_by_name("a").expect("a");
        let b = tree.find_by_name("b").expect("b");
        tree.succeed(a, "done");
        assert_eq!(tree.find_active_goal(), Some(b));
        tree.fail(b, FailureReason::Aborted);
        assert_eq!(tree.status(tree.root()), ProgressStatus::InProgress);

        assert_eq!(tree.find_active_goal(), Some(a));
        assert_eq!(tree.status(a), ProgressStatus::InProgress);
        assert_eq!(tree.status(b), ProgressStatus::InProgress);
    }

    #[test]
    fn allocation_follows_the_active_path() {
        let mut tree = GoalTree::new(
            node(GoalsCombinator::Seq, vec![leaf("a"), leaf("b")]).maxbudget(10.0),
        )
        .expect("tree");
        tree.allocate_initial_budget(5.0).expect("budget");
        let a = tree.find_active_goal().expect("active");
        assert_eq!(remaining(&tree, "a"), 5.0);
        assert_eq!(remaining(&tree, "b"), f64::INFINITY);

        tree.register_consumed_budget(a, 2.0);
        assert_eq!(tree.budget(tree.root()).map(Budget::remaining), Some(3.0));
        assert_eq!(remaining(&tree, "a"), 3.0);

        // Selecting again must not hand `a` a fresh allocation.
        assert_eq!(tree.find_active_goal(), Some(a));
        assert_eq!(remaining(&tree, "a"), 3.0);

        tree.succeed(a, "done");
        tree.find_active_goal();
        assert_eq!(remaining(&tree, "b"), 3.0);
    }

    #[test]
    fn leaf_cap_limits_inherited_budget() {
        let mut tree = GoalTree::new(node(
            GoalsCombinator::Seq,
            vec![leaf("a").maxbudget(2.0), leaf("b")],
        ))
        .expect("tree");
        tree.find_active_goal();
        assert_eq!(remaining(&tree, "a"), 2.0);
    }

    #[test]
    fn repeat_reallocates_after_exhaustion() {
        let mut tree = GoalTree::new(
            node(GoalsCombinator::Repeat, vec![leaf("a").maxbudget(1.0)]).maxbudget(5.0),
        )
        .expect("tree");
        let a = tree.find_active_goal().expect("active");
        assert_eq!(tree.register_consumed_budget(a, 1.0), vec![a]);
        assert_eq!(tree.status(tree.root()), ProgressStatus::InProgress);

        assert_eq!(tree.find_active_goal(), Some(a));
        assert_eq!(remaining(&tree, "a"), 1.0);
        assert_eq!(tree.budget(tree.root()).map(Budget::remaining), Some(4.0));

        for _ in 0..4 {
            tree.find_active_goal();
            tree.register_consumed_budget(a, 1.0);
        }
        assert_eq!(tree.status(tree.root()), ProgressStatus::Failed);
        assert_eq!(tree.find_active_goal(), None);
    }
}
