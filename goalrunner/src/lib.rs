//! Goal-directed agents driven by hierarchical goal and tactic trees.
//!
//! An agent owns a state and one goal tree. Every tick it selects the active
//! leaf goal, lets the leaf's tactic offer its enabled actions, runs one of
//! them and checks whether the resulting proposal solves the goal. Success,
//! failure and budget consumption then propagate up the tree until the top
//! goal is resolved.
//!
//! - **[`core`]**: Pure, deterministic tree logic (status, selection, budget,
//!   editing, validation, reports). No threads, no I/O.
//! - **[`agent`]**: The single-step execution cycle.
//! - **[`autonomous`]**: A threaded loop around an agent, steered through an
//!   [`autonomous::AgentHandle`].
//! - **[`comms`]**: Message routing between agents; a message can wake a
//!   paused or sleeping loop.
//!
//! Trees are usually built with the constructors in [`dsl`].

pub mod agent;
pub mod autonomous;
pub mod comms;
pub mod config;
pub mod core;
pub mod cost;
pub mod deliberation;
pub mod dsl;
pub mod error;
pub mod logging;
pub mod oracle;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{Agent, ExecutedTick, TickOutcome};
pub use autonomous::{AgentHandle, AutonomousAgent, LoopOutcome, LoopState, LoopStop};
pub use crate::core::goal::{GoalNode, GoalStructure, GoalsCombinator};
pub use crate::core::goal_tree::{GoalId, GoalTree};
pub use crate::core::status::{FailureReason, ProgressStatus};
pub use crate::core::tactic::{Action, Tactic, TacticCombinator};
pub use error::{AgentError, GoalTreeError};
