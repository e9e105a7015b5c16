//! A goal-directed agent and its single-step execution cycle.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::core::goal::GoalStructure;
use crate::core::goal_tree::{GoalId, GoalTree};
use crate::core::path::goal_path;
use crate::core::status::{FailureReason, ProgressStatus};
use crate::cost::{CostFunction, UnitCost};
use crate::deliberation::{self, Deliberation, FirstEnabled};
use crate::error::{AgentError, GoalTreeError};
use crate::oracle::DataCollector;

/// What one call to [`Agent::update`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No goal is attached.
    Idle,
    /// The tree was already concluded and has been detached.
    Concluded(ProgressStatus),
    /// The active goal has no enabled action; nothing ran and nothing was
    /// charged.
    NoEnabledAction { goal: String },
    Executed(ExecutedTick),
}

impl TickOutcome {
    /// Final status of the tree if this tick detached it.
    pub fn concluded(&self) -> Option<ProgressStatus> {
        match self {
            Self::Concluded(status) => Some(*status),
            Self::Executed(tick) => tick.concluded,
            Self::Idle | Self::NoEnabledAction { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedTick {
    pub goal: String,
    pub action: String,
    /// The action produced a proposal that solved the goal.
    pub solved: bool,
    pub aborted: bool,
    /// Budget charged to the active path.
    pub cost: f64,
    /// Final status of the tree, set when this tick concluded it.
    pub concluded: Option<ProgressStatus>,
}

type Observer<S> = Box<dyn FnMut(&mut S) + Send>;

/// Owns a state, at most one goal tree, and the policies used to run it.
pub struct Agent<S, P> {
    id: String,
    role: Option<String>,
    state: Option<S>,
    observer: Option<Observer<S>>,
    goal: Option<GoalTree<S, P>>,
    current: Option<GoalId>,
    last_handled_goal: Option<GoalTree<S, P>>,
    deliberation: Box<dyn Deliberation<S>>,
    cost: Box<dyn CostFunction<S>>,
    initial_budget: Option<f64>,
    collector: Option<Arc<dyn DataCollector>>,
    ticks: u64,
}

impl<S, P> fmt::Debug for Agent<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state.is_some())
            .field("observer", &self.observer.is_some())
            .field("goal", &self.goal)
            .field("current", &self.current)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl<S, P> Agent<S, P> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: None,
            state: None,
            observer: None,
            goal: None,
            current: None,
            last_handled_goal: None,
            deliberation: Box::new(FirstEnabled),
            cost: Box::new(UnitCost::default()),
            initial_budget: None,
            collector: None,
            ticks: 0,
        }
    }

    /// Apply deliberation, cost per tick and initial budget from a config.
    /// The config is validated first.
    pub fn with_config(mut self, config: &AgentConfig) -> Result<Self, AgentError> {
        config
            .validate()
            .map_err(|source| AgentError::InvalidConfig {
                agent: self.id.clone(),
                source,
            })?;
        self.deliberation = deliberation::from_config(config);
        self.cost = Box::new(UnitCost(config.cost_per_tick));
        self.initial_budget = config.initial_budget;
        Ok(self)
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn attach_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Refresh the state from the outside world at the start of every tick,
    /// before any guard is evaluated.
    pub fn with_observer<F>(mut self, observe: F) -> Self
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        self.observer = Some(Box::new(observe));
        self
    }

    pub fn with_deliberation(mut self, deliberation: impl Deliberation<S> + 'static) -> Self {
        self.deliberation = Box::new(deliberation);
        self
    }

    /// Every tick must cost a finite, non-negative amount; anything else
    /// makes [`Agent::update`] fail with [`AgentError::InvalidCost`].
    pub fn with_cost_function(mut self, cost: impl CostFunction<S> + 'static) -> Self {
        self.cost = Box::new(cost);
        self
    }

    pub fn with_data_collector(mut self, collector: Arc<dyn DataCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Budget given to the top goal of every tree set afterwards.
    /// `None` means unbounded.
    pub fn with_initial_budget(mut self, budget: Option<f64>) -> Self {
        self.initial_budget = budget;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut S> {
        self.state.as_mut()
    }

    pub fn initial_budget(&self) -> Option<f64> {
        self.initial_budget
    }

    pub fn has_data_collector(&self) -> bool {
        self.collector.is_some()
    }

    /// The attached goal tree, `None` once it concluded and was detached.
    pub fn goal(&self) -> Option<&GoalTree<S, P>> {
        self.goal.as_ref()
    }

    /// The goal worked on by the last tick.
    pub fn current_goal(&self) -> Option<GoalId> {
        self.current
    }

    /// The last tree that was detached after concluding.
    pub fn last_handled_goal(&self) -> Option<&GoalTree<S, P>> {
        self.last_handled_goal.as_ref()
    }

    /// Ticks that executed an action.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Replace the goal with a new tree built from `goal`, using the
    /// configured initial budget.
    pub fn set_goal(&mut self, goal: GoalStructure<S, P>) -> Result<(), AgentError> {
        let tree = GoalTree::new(goal)?;
        self.set_goal_tree(tree, self.initial_budget)
    }

    /// Replace the goal, handing `budget` to its top node.
    pub fn set_goal_with_budget(
        &mut self,
        goal: GoalStructure<S, P>,
        budget: f64,
    ) -> Result<(), AgentError> {
        let tree = GoalTree::new(goal)?;
        self.set_goal_tree(tree, Some(budget))
    }

    /// Replace the goal with an already built tree. The previous tree, if
    /// any, is discarded.
    pub fn set_goal_tree(
        &mut self,
        mut tree: GoalTree<S, P>,
        budget: Option<f64>,
    ) -> Result<(), AgentError> {
        if self.state.is_none() {
            return Err(AgentError::NoState {
                agent: self.id.clone(),
            });
        }
        if self.collector.is_none() {
            if let Some(goal) = tree.oracle_goals().next() {
                return Err(AgentError::MissingDataCollector {
                    agent: self.id.clone(),
                    goal: goal.name().to_string(),
                });
            }
        }
        if let Some(budget) = budget {
            tree.allocate_initial_budget(budget)?;
        }
        if self.goal.is_some() {
            debug!(agent = %self.id, "replacing goal");
        }
        info!(agent = %self.id, goal = %tree.label(tree.root()), budget = ?budget, "goal set");
        self.goal = Some(tree);
        self.current = None;
        Ok(())
    }

    /// Run one execution cycle.
    ///
    /// Refreshes the state through the observer, if any, then finds the
    /// active goal, lets the deliberation policy pick one of the
    /// enabled actions of its tactic, runs it, submits its proposal, charges
    /// the tick's cost to the active path and detaches the tree once it
    /// concluded. An ABORT fails the goal without charging anything. A goal
    /// built by a deploy action is inserted right after the current goal.
    pub fn update(&mut self) -> Result<TickOutcome, AgentError> {
        let Some(tree) = self.goal.as_mut() else {
            return Ok(TickOutcome::Idle);
        };
        let Some(state) = self.state.as_mut() else {
            return Err(AgentError::NoState {
                agent: self.id.clone(),
            });
        };
        if let Some(observe) = self.observer.as_mut() {
            observe(state);
        }

        let Some(goal_id) = tree.find_active_goal() else {
            let status = tree.status(tree.root());
            self.detach();
            return Ok(TickOutcome::Concluded(status));
        };
        self.current = Some(goal_id);

        let goal = tree.goal_mut(goal_id).ok_or(GoalTreeError::NoActiveGoal)?;
        let goal_name = goal.name().to_string();
        let tactic = goal
            .tactic_mut()
            .ok_or_else(|| GoalTreeError::MissingTactic {
                goal: goal_name.clone(),
            })?;
        let candidates = tactic.enabled_actions(state);
        let Some(chosen) = self.deliberation.choose(state, &candidates) else {
            debug!(agent = %self.id, goal = %goal_name, "no enabled action");
            return Ok(TickOutcome::NoEnabledAction { goal: goal_name });
        };
        let Some(action) = tactic.action_mut(chosen) else {
            return Ok(TickOutcome::NoEnabledAction { goal: goal_name });
        };
        let action_name = action.name().to_string();
        let aborted = action.is_abort();

        let started = Instant::now();
        let outcome = action.execute(state);
        let elapsed = started.elapsed();
        let deployment = action.take_deployment();
        let proposal = outcome.map_err(|source| AgentError::Action {
            agent: self.id.clone(),
            action: action_name.clone(),
            source,
        })?;
        self.ticks += 1;
        debug!(
            agent = %self.id,
            goal = %goal_path(tree, goal_id),
            action = %action_name,
            elapsed_ms = elapsed.as_millis(),
            "action executed"
        );

        let mut solved = false;
        let mut cost = 0.0;
        if aborted {
            tree.fail(goal_id, FailureReason::Aborted);
            info!(
                agent = %self.id,
                goal = %goal_name,
                reason = %FailureReason::Aborted,
                "goal failed"
            );
        } else {
            cost = self.cost.cost(state, elapsed);
            if !cost.is_finite() || cost < 0.0 {
                return Err(AgentError::InvalidCost {
                    agent: self.id.clone(),
                    cost,
                });
            }
            if let Some(proposal) = proposal {
                let goal = tree.goal_mut(goal_id).ok_or(GoalTreeError::NoActiveGoal)?;
                solved = goal.submit_proposal(proposal);
                if solved {
                    info!(agent = %self.id, goal = %goal_name, "goal solved");
                    if let (Some(verdict), Some(collector)) = (goal.verdict(), &self.collector) {
                        collector.register_verdict(&self.id, verdict);
                    }
                } else {
                    debug!(
                        agent = %self.id,
                        goal = %goal_name,
                        distance = ?goal.distance(),
                        "proposal rejected"
                    );
                }
            }
            tree.register_used_time(goal_id, elapsed);
            tree.register_consumed_budget(goal_id, cost);
        }

        let goal_done = tree.status(goal_id).is_terminal();
        if let Some(tactic) = tree.goal_mut(goal_id).and_then(|goal| goal.tactic_mut()) {
            if goal_done {
                tactic.reset();
            } else {
                tactic.advance(chosen);
            }
        }
        if let Some(deployed) = deployment {
            let inserted = tree.add_after(goal_id, deployed)?;
            info!(
                agent = %self.id,
                goal = %tree.label(inserted),
                after = %goal_name,
                "goal deployed"
            );
        }

        let concluded = tree.is_concluded().then(|| tree.status(tree.root()));
        if concluded.is_some() {
            self.detach();
        }
        Ok(TickOutcome::Executed(ExecutedTick {
            goal: goal_name,
            action: action_name,
            solved,
            aborted,
            cost,
            concluded,
        }))
    }

    /// Insert `goal` right after the current goal.
    pub fn add_after(&mut self, goal: GoalStructure<S, P>) -> Result<GoalId, AgentError> {
        let (tree, current) = self.editing_target()?;
        Ok(tree.add_after(current, goal)?)
    }

    /// Insert `goal` right before the current goal so that it is solved first.
    pub fn add_before(&mut self, goal: GoalStructure<S, P>) -> Result<GoalId, AgentError> {
        let (tree, current) = self.editing_target()?;
        Ok(tree.add_before(current, goal)?)
    }

    /// Detach an unresolved subtree that the current goal does not depend on.
    pub fn remove(&mut self, goal: GoalId) -> Result<GoalId, AgentError> {
        let tree = self.goal.as_mut().ok_or(GoalTreeError::NoActiveGoal)?;
        Ok(tree.remove(self.current, goal)?)
    }

    /// Force the whole tree FAILED and detach it.
    pub fn fail_top_goal(&mut self, reason: FailureReason) -> Option<ProgressStatus> {
        let tree = self.goal.as_mut()?;
        let root = tree.root();
        tree.fail(root, reason);
        let status = tree.status(root);
        self.detach();
        Some(status)
    }

    fn editing_target(&mut self) -> Result<(&mut GoalTree<S, P>, GoalId), GoalTreeError> {
        let tree = self.goal.as_mut().ok_or(GoalTreeError::NoActiveGoal)?;
        let current = match self.current {
            Some(id) if tree.is_live(id) => id,
            _ => tree.find_active_goal().ok_or(GoalTreeError::NoActiveGoal)?,
        };
        self.current = Some(current);
        Ok((tree, current))
    }

    fn detach(&mut self) {
        let Some(tree) = self.goal.take() else {
            return;
        };
        let root = tree.root();
        let status = tree.status(root);
        match tree.failure_reason(root) {
            Some(reason) => info!(
                agent = %self.id,
                goal = %goal_path(&tree, root),
                status = %status,
                reason = %reason,
                consumed = tree.budget(root).map_or(0.0, |budget| budget.consumed()),
                "goal concluded"
            ),
            None => info!(
                agent = %self.id,
                goal = %goal_path(&tree, root),
                status = %status,
                consumed = tree.budget(root).map_or(0.0, |budget| budget.consumed()),
                "goal concluded"
            ),
        }
        self.last_handled_goal = Some(tree);
        self.current = None;
    }
}
