//! Typed errors for misuse of the goal/tactic API and for failing actions.

use thiserror::Error;

/// Structural errors raised while building or editing a goal tree.
///
/// These indicate programmer misuse and are always surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GoalTreeError {
    #[error("{combinator} node has no children")]
    EmptyCombinator { combinator: &'static str },

    #[error("REPEAT node must have exactly one child, found {found}")]
    RepeatArity { found: usize },

    #[error("goal '{goal}': max budget must be finite and > 0, got {value}")]
    InvalidMaxBudget { goal: String, value: f64 },

    #[error("initial budget must be finite and > 0, got {0}")]
    InvalidInitialBudget(f64),

    #[error("goal '{goal}' has no tactic")]
    MissingTactic { goal: String },

    #[error("test goal '{goal}' has no oracle")]
    MissingOracle { goal: String },

    #[error("tactic of goal '{goal}': {combinator} node has no children")]
    EmptyTactic {
        goal: String,
        combinator: &'static str,
    },

    #[error("no goal is currently active")]
    NoActiveGoal,

    #[error("cannot insert next to the top goal: the tree has no parent combinator")]
    SingletonTree,

    #[error("goal '{goal}' is an ancestor of the active goal and cannot be removed")]
    RequiredAncestor { goal: String },

    #[error("removing goal '{goal}' would leave the top goal without children")]
    ChildlessRoot { goal: String },

    #[error("goal '{goal}' is already concluded")]
    AlreadyConcluded { goal: String },

    #[error("unknown goal node {0}")]
    UnknownGoal(usize),
}

/// Errors surfaced by [`crate::agent::Agent`].
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent '{agent}' has no state attached")]
    NoState { agent: String },

    #[error("agent '{agent}': goal '{goal}' has an oracle but no data collector is attached")]
    MissingDataCollector { agent: String, goal: String },

    #[error("agent '{agent}': invalid configuration")]
    InvalidConfig {
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("agent '{agent}': tick cost must be finite and >= 0, got {cost}")]
    InvalidCost { agent: String, cost: f64 },

    #[error("agent '{agent}': action '{action}' failed")]
    Action {
        agent: String,
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Tree(#[from] GoalTreeError),
}
