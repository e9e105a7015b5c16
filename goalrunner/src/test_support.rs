//! Test-only helpers: a counter world and ready-made goals over it.

use crate::core::goal::{GoalNode, GoalStructure};
use crate::core::tactic::{Action, Tactic};

/// Agent state used across tests: a counter the actions increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    pub value: i32,
}

impl Counter {
    pub fn at(value: i32) -> Self {
        Self { value }
    }
}

/// Increments the counter and proposes the new value.
pub fn increment() -> Action<Counter, i32> {
    Action::new("increment").do1(|s: &mut Counter| {
        s.value += 1;
        Some(s.value)
    })
}

pub fn increment_tactic() -> Tactic<Counter, i32> {
    increment().lift()
}

/// A goal named `reach {target}`, solved once the counter equals `target`.
pub fn reach(target: i32) -> GoalNode<Counter, i32> {
    GoalNode::new(format!("reach {target}"))
        .to_solve(move |p: &i32| *p == target)
        .with_tactic(increment_tactic())
}

pub fn reach_goal(target: i32) -> GoalStructure<Counter, i32> {
    reach(target).lift()
}

/// A goal that can never be solved; each tick still increments.
pub fn endless(name: &str) -> GoalStructure<Counter, i32> {
    GoalNode::new(name)
        .to_solve(|_: &i32| false)
        .with_tactic(increment_tactic())
        .lift()
}

/// A goal whose only action is guarded by `false`.
pub fn blocked(name: &str) -> GoalStructure<Counter, i32> {
    GoalNode::new(name)
        .to_solve(|_: &i32| true)
        .with_tactic(Action::new("never").on(|_: &Counter| false).lift())
        .lift()
}
