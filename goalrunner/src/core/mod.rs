//! Deterministic, pure logic of the goal/tactic engine.
//!
//! Core modules are free of I/O and threads. They operate on in-memory trees
//! and return deterministic outputs suitable for tests.

pub mod budget;
pub mod editing;
pub mod goal;
pub mod goal_tree;
pub mod invariants;
pub mod path;
pub mod report;
pub mod selector;
pub mod status;
pub mod tactic;
