//! Cost charged to the active goal after an action ran.

use std::time::Duration;

/// What a tick cost, given the agent state after the action and the time the
/// action took.
pub trait CostFunction<S>: Send {
    fn cost(&mut self, state: &S, elapsed: Duration) -> f64;
}

/// Fixed cost per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCost(pub f64);

impl Default for UnitCost {
    fn default() -> Self {
        Self(1.0)
    }
}

impl<S> CostFunction<S> for UnitCost {
    fn cost(&mut self, _state: &S, _elapsed: Duration) -> f64 {
        self.0
    }
}

/// Milliseconds spent in the action.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElapsedTimeCost;

impl<S> CostFunction<S> for ElapsedTimeCost {
    fn cost(&mut self, _state: &S, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * 1000.0
    }
}
