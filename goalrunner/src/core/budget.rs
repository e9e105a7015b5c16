//! Execution budget carried by every goal-tree node.
//!
//! A budget is inherited top-down when a node joins the active path and
//! consumed bottom-up along that path after every tick.

use serde::{Deserialize, Serialize};

/// Budget bookkeeping for one node.
///
/// `max` is the user cap, `remaining` is what the node may still spend since
/// it was last adopted, and `consumed` is the exact running total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    max: f64,
    remaining: f64,
    consumed: f64,
}

impl Default for Budget {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl Budget {
    pub fn unbounded() -> Self {
        Self {
            max: f64::INFINITY,
            remaining: f64::INFINITY,
            consumed: 0.0,
        }
    }

    /// A budget capped at `max`. The cap must be finite and positive.
    /// Until adopted the node may spend up to its cap.
    pub fn capped(max: f64) -> Option<Self> {
        if !is_valid_amount(max) {
            return None;
        }
        Some(Self {
            max,
            remaining: max,
            consumed: 0.0,
        })
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    /// Adopt the node with whatever its parent has left, never above the cap.
    pub fn allocate(&mut self, parent_remaining: f64) {
        self.remaining = parent_remaining.min(self.max);
    }

    /// Overwrite the remaining budget directly (used for the initial budget of
    /// a root and for freshly inserted wrapper nodes).
    pub(crate) fn set_remaining(&mut self, remaining: f64) {
        self.remaining = remaining.min(self.max).max(0.0);
    }

    /// Subtract `amount`, saturating at zero.
    pub fn consume(&mut self, amount: f64) {
        self.consumed += amount;
        self.remaining = (self.remaining - amount).max(0.0);
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn is_bounded(&self) -> bool {
        self.max.is_finite()
    }
}

/// True for amounts usable as a cap or initial budget.
pub fn is_valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0
}

/// Render a budget value for reports: `None` stands for unbounded.
pub fn finite(amount: f64) -> Option<f64> {
    amount.is_finite().then_some(amount)
}
