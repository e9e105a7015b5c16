//! Structural invariants of a goal tree that the type system cannot enforce.

use std::collections::HashSet;

use crate::core::goal::GoalsCombinator;
use crate::core::goal_tree::{GoalId, GoalTree};
use crate::core::path::goal_path;

/// Check structural invariants of the live tree:
/// - Every node is reachable exactly once (no sharing, no cycles)
/// - Parent pointers agree with child lists
/// - Combinators have children and REPEAT has exactly one
/// - Remaining budget never exceeds the cap and is never negative
/// - At most one active leaf exists
pub fn validate_invariants<S, P>(tree: &GoalTree<S, P>) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    validate_node(tree, tree.root(), &mut seen, &mut errors);
    if tree.parent(tree.root()).is_some() {
        errors.push(format!("{}: root has a parent", tree.label(tree.root())));
    }
    let open_leaves = tree
        .leaves()
        .filter(|(id, _)| is_on_active_path(tree, *id))
        .count();
    if open_leaves > 1 {
        errors.push(format!("{open_leaves} leaves are active at once"));
    }
    errors
}

fn validate_node<S, P>(
    tree: &GoalTree<S, P>,
    id: GoalId,
    seen: &mut HashSet<GoalId>,
    errors: &mut Vec<String>,
) {
    let path = goal_path(tree, id);
    if !seen.insert(id) {
        errors.push(format!("{path}: node reached twice"));
        return;
    }

    if let Some(budget) = tree.budget(id) {
        if budget.remaining() < 0.0 {
            errors.push(format!("{path}: negative remaining budget"));
        }
        if budget.remaining() > budget.max() {
            errors.push(format!(
                "{path}: remaining budget {} exceeds max budget {}",
                budget.remaining(),
                budget.max()
            ));
        }
    }

    let children = tree.children(id);
    match tree.combinator(id) {
        Some(GoalsCombinator::Repeat) if children.len() != 1 => {
            errors.push(format!("{path}: REPEAT has {} children", children.len()));
        }
        Some(kind) if children.is_empty() => {
            errors.push(format!("{path}: {kind} has no children"));
        }
        _ => {}
    }

    for child in children {
        if tree.parent(*child) != Some(id) {
            errors.push(format!("{}: parent pointer mismatch", goal_path(tree, *child)));
        }
        validate_node(tree, *child, seen, errors);
    }
}

/// True when every ancestor would route selection to `id`.
fn is_on_active_path<S, P>(tree: &GoalTree<S, P>, id: GoalId) -> bool {
    if !tree.status(id).in_progress() {
        return false;
    }
    let mut child = id;
    while let Some(parent) = tree.parent(child) {
        let siblings = tree.children(parent);
        let chosen = match tree.combinator(parent) {
            Some(GoalsCombinator::Seq) => siblings
                .iter()
                .find(|sibling| !tree.status(**sibling).success()),
            Some(GoalsCombinator::FirstOf) => siblings
                .iter()
                .find(|sibling| !tree.status(**sibling).failed()),
            _ => siblings.first(),
        };
        if chosen != Some(&child) {
            return false;
        }
        child = parent;
    }
    true
}
