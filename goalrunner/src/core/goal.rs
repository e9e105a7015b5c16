//! Goal leaves and the tree-shaped builder used to compose them.

use std::fmt;

use crate::core::status::{FailureReason, ProgressStatus};
use crate::core::tactic::{Tactic, TacticTree};
use crate::oracle::VerdictEvent;

/// Default tolerance on `|distance|` for a proposal to count as a solution.
pub const DEFAULT_EPSILON: f64 = 0.005;

type DistanceFn<P> = Box<dyn Fn(&P) -> f64 + Send>;
type Oracle<P> = Box<dyn Fn(&P) -> VerdictEvent + Send>;

/// A primitive objective: a distance function over proposals plus the tactic
/// used to produce them.
///
/// A goal without a predicate never accepts a proposal.
pub struct GoalNode<S, P> {
    name: String,
    description: Option<String>,
    distance_fn: Option<DistanceFn<P>>,
    epsilon: f64,
    tactic: Option<TacticTree<S, P>>,
    oracle: Option<Oracle<P>>,
    requires_oracle: bool,
    status: ProgressStatus,
    failure: Option<FailureReason>,
    info: Option<String>,
    distance: Option<f64>,
    proposal: Option<P>,
}

impl<S, P> fmt::Debug for GoalNode<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoalNode")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("failure", &self.failure)
            .field("distance", &self.distance)
            .field("tactic", &self.tactic)
            .field("oracle", &self.oracle.is_some())
            .finish()
    }
}

impl<S: 'static, P: 'static> GoalNode<S, P> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            distance_fn: None,
            epsilon: DEFAULT_EPSILON,
            tactic: None,
            oracle: None,
            requires_oracle: false,
            status: ProgressStatus::InProgress,
            failure: None,
            info: None,
            distance: None,
            proposal: None,
        }
    }

    /// A goal that must carry an oracle before it can be given to an agent.
    pub fn test_goal(name: impl Into<String>) -> Self {
        Self {
            requires_oracle: true,
            ..Self::new(name)
        }
    }

    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Solve when `predicate` holds on a proposal (distance 0, else 1).
    pub fn to_solve<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&P) -> bool + Send + 'static,
    {
        self.distance_fn = Some(Box::new(move |p| if predicate(p) { 0.0 } else { 1.0 }));
        self
    }

    /// Solve when `|distance(proposal)| <= epsilon`.
    pub fn with_distance_function<F>(mut self, distance: F) -> Self
    where
        F: Fn(&P) -> f64 + Send + 'static,
    {
        self.distance_fn = Some(Box::new(distance));
        self
    }

    /// Negative values are ignored and the default is kept.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        if epsilon >= 0.0 {
            self.epsilon = epsilon;
        }
        self
    }

    pub fn with_tactic(mut self, tactic: Tactic<S, P>) -> Self {
        self.tactic = Some(tactic.into());
        self
    }

    /// Attach an oracle, invoked on the solving proposal once the goal
    /// succeeds. Its verdict is forwarded to the agent's data collector.
    pub fn oracle<F>(mut self, oracle: F) -> Self
    where
        F: Fn(&P) -> VerdictEvent + Send + 'static,
    {
        self.oracle = Some(Box::new(oracle));
        self
    }

    pub fn lift(self) -> GoalStructure<S, P> {
        GoalStructure {
            shape: GoalShape::Primitive(Box::new(self)),
            max_budget: None,
        }
    }

    /// Shorthand for `lift().maxbudget(budget)`.
    pub fn maxbudget(self, budget: f64) -> GoalStructure<S, P> {
        self.lift().maxbudget(budget)
    }
}

impl<S, P> GoalNode<S, P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// Distance of the last submitted proposal, if any.
    pub fn distance(&self) -> Option<f64> {
        self.distance
    }

    /// The last submitted proposal.
    pub fn proposal(&self) -> Option<&P> {
        self.proposal.as_ref()
    }

    /// The last proposal, but only once it solved the goal.
    pub fn solution(&self) -> Option<&P> {
        self.proposal.as_ref().filter(|_| self.status.success())
    }

    pub fn tactic(&self) -> Option<&TacticTree<S, P>> {
        self.tactic.as_ref()
    }

    pub(crate) fn tactic_mut(&mut self) -> Option<&mut TacticTree<S, P>> {
        self.tactic.as_mut()
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    pub(crate) fn requires_oracle(&self) -> bool {
        self.requires_oracle
    }

    /// Evaluate a proposal. Returns true when it solved the goal.
    pub fn submit_proposal(&mut self, proposal: P) -> bool {
        let distance = self
            .distance_fn
            .as_ref()
            .map_or(f64::INFINITY, |distance| distance(&proposal));
        self.distance = Some(distance);
        self.proposal = Some(proposal);
        let solved = distance.abs() <= self.epsilon;
        if solved {
            self.status = ProgressStatus::Success;
        }
        solved
    }

    /// Verdict of the oracle on the solving proposal.
    pub(crate) fn verdict(&self) -> Option<VerdictEvent> {
        let oracle = self.oracle.as_ref()?;
        self.solution().map(|solution| oracle(solution))
    }

    pub(crate) fn set_success(&mut self, info: impl Into<String>) {
        self.status = ProgressStatus::Success;
        self.info = Some(info.into());
    }

    pub(crate) fn set_failed(&mut self, reason: FailureReason) {
        self.status = ProgressStatus::Failed;
        self.info = Some(reason.to_string());
        self.failure = Some(reason);
    }

    /// Back to the initial condition for a REPEAT retry. The last proposal is
    /// kept for inspection.
    pub(crate) fn rearm(&mut self) {
        self.status = ProgressStatus::InProgress;
        self.failure = None;
        self.info = None;
        self.distance = None;
        if let Some(tactic) = &mut self.tactic {
            tactic.reset();
        }
    }
}

/// Goal-tree combinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalsCombinator {
    /// Ordered AND: children are solved left to right.
    Seq,
    /// Ordered OR: children are tried left to right until one succeeds.
    FirstOf,
    /// Retry the only child until it succeeds.
    Repeat,
}

impl GoalsCombinator {
    pub fn label(self) -> &'static str {
        match self {
            Self::Seq => "SEQ",
            Self::FirstOf => "FIRSTOF",
            Self::Repeat => "REPEAT",
        }
    }
}

impl fmt::Display for GoalsCombinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shape of a goal-structure node.
pub enum GoalShape<S, P> {
    Primitive(Box<GoalNode<S, P>>),
    Combinator(GoalsCombinator, Vec<GoalStructure<S, P>>),
}

/// Detached, tree-shaped goal builder. Becomes a [`crate::core::goal_tree::GoalTree`]
/// when handed to an agent or grafted into an existing tree.
pub struct GoalStructure<S, P> {
    pub(crate) shape: GoalShape<S, P>,
    pub(crate) max_budget: Option<f64>,
}

impl<S, P> fmt::Debug for GoalStructure<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            GoalShape::Primitive(goal) => write!(f, "Goal({})", goal.name()),
            GoalShape::Combinator(kind, children) => f
                .debug_tuple(kind.label())
                .field(children)
                .finish(),
        }
    }
}

impl<S, P> GoalStructure<S, P> {
    pub fn combinator(kind: GoalsCombinator, children: Vec<GoalStructure<S, P>>) -> Self {
        Self {
            shape: GoalShape::Combinator(kind, children),
            max_budget: None,
        }
    }

    /// Cap the budget this subtree may receive each time it is adopted.
    /// Validated when the structure is turned into a tree.
    pub fn maxbudget(mut self, budget: f64) -> Self {
        self.max_budget = Some(budget);
        self
    }

    pub fn shape(&self) -> &GoalShape<S, P> {
        &self.shape
    }

    /// Goal name for leaves, combinator label otherwise.
    pub fn label(&self) -> &str {
        match &self.shape {
            GoalShape::Primitive(goal) => goal.name(),
            GoalShape::Combinator(kind, _) => kind.label(),
        }
    }
}
