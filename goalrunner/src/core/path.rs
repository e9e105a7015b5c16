//! Helpers for rendering deterministic goal paths.

use crate::core::goal_tree::{GoalId, GoalTree};

/// Return the `/`-separated label path from the top of `id`'s subtree down
/// to `id`, e.g. `SEQ/FIRSTOF/open door`.
pub fn goal_path<S, P>(tree: &GoalTree<S, P>, id: GoalId) -> String {
    let mut labels: Vec<&str> = tree.ancestors(id).map(|node| tree.label(node)).collect();
    labels.reverse();
    labels.join("/")
}
