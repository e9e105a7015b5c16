//! Actions and the tactic trees that combine them.
//!
//! A [`Tactic`] is the user-facing builder; once attached to a goal it is
//! flattened into a [`TacticTree`], an arena that also tracks which subtree is
//! current between ticks (SEQ progress and persistent actions).

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::core::goal::GoalStructure;
use crate::error::GoalTreeError;

type Guard<S> = Box<dyn Fn(&S) -> bool + Send>;
type Behavior<S, P> = Box<dyn FnMut(&mut S) -> Result<Option<P>> + Send>;
type Deployer<S, P> = Box<dyn FnOnce(&S) -> (GoalStructure<S, P>, P) + Send>;

enum ActionKind<S, P> {
    Effect(Behavior<S, P>),
    /// Emptied by the one execution it allows.
    Deploy(Option<Deployer<S, P>>),
    Abort,
}

/// A unit of executable behavior, guarded by predicates over the agent state.
pub struct Action<S, P> {
    name: String,
    description: Option<String>,
    guards: Vec<Guard<S>>,
    kind: ActionKind<S, P>,
    until: Option<Guard<S>>,
    completed: bool,
    deployment: Option<GoalStructure<S, P>>,
    invocations: u32,
    total_runtime: Duration,
}

impl<S, P> fmt::Debug for Action<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("abort", &self.is_abort())
            .field("deploys", &self.is_deploy())
            .field("guards", &self.guards.len())
            .field("persistent", &self.until.is_some())
            .field("completed", &self.completed)
            .field("invocations", &self.invocations)
            .finish()
    }
}

impl<S: 'static, P: 'static> Action<S, P> {
    /// An action that is always enabled and produces no proposal until a
    /// behavior is attached with [`Action::do1`] or [`Action::do_try`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            guards: Vec::new(),
            kind: ActionKind::Effect(Box::new(|_| Ok(None))),
            until: None,
            completed: false,
            deployment: None,
            invocations: 0,
            total_runtime: Duration::ZERO,
        }
    }

    /// The ABORT action: always enabled, fails the current goal when chosen.
    pub fn abort() -> Self {
        Self {
            kind: ActionKind::Abort,
            ..Self::new("abort")
        }
    }

    pub fn desc(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add an enablement guard. All guards must hold for the action to run.
    pub fn on<F>(mut self, guard: F) -> Self
    where
        F: Fn(&S) -> bool + Send + 'static,
    {
        self.guards.push(Box::new(guard));
        self
    }

    /// Set an infallible behavior. `None` means "no proposal this tick".
    pub fn do1<F>(mut self, mut behavior: F) -> Self
    where
        F: FnMut(&mut S) -> Option<P> + Send + 'static,
    {
        self.kind = ActionKind::Effect(Box::new(move |state| Ok(behavior(state))));
        self
    }

    /// Set a fallible behavior; its error propagates out of `Agent::update`.
    pub fn do_try<F>(mut self, behavior: F) -> Self
    where
        F: FnMut(&mut S) -> Result<Option<P>> + Send + 'static,
    {
        self.kind = ActionKind::Effect(Box::new(behavior));
        self
    }

    /// Make the action persistent: it stays current across ticks until
    /// `done` holds right after one of its executions.
    pub fn until<F>(mut self, done: F) -> Self
    where
        F: Fn(&S) -> bool + Send + 'static,
    {
        self.until = Some(Box::new(done));
        self
    }

    pub fn lift(self) -> Tactic<S, P> {
        Tactic::Primitive(self)
    }
}

impl<S: 'static, P: Default + 'static> Action<S, P> {
    /// An action that runs at most once. It builds a goal from the state,
    /// which the agent then inserts right after the current goal, and
    /// proposes `P::default()`.
    ///
    /// Once run it stays disabled, also when its goal is retried.
    pub fn deploy<F>(name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&S) -> GoalStructure<S, P> + Send + 'static,
    {
        let deployer: Deployer<S, P> = Box::new(move |state: &S| (build(state), P::default()));
        Self {
            kind: ActionKind::Deploy(Some(deployer)),
            ..Self::new(name)
        }
    }
}

impl<S, P> Action<S, P> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_abort(&self) -> bool {
        matches!(self.kind, ActionKind::Abort)
    }

    pub fn is_deploy(&self) -> bool {
        matches!(self.kind, ActionKind::Deploy(_))
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    pub fn total_runtime(&self) -> Duration {
        self.total_runtime
    }

    pub fn is_enabled(&self, state: &S) -> bool {
        let spent = matches!(self.kind, ActionKind::Deploy(None));
        !spent && self.guards.iter().all(|guard| guard(state))
    }

    /// Run the behavior once and update completion and statistics.
    ///
    /// Calling this on the ABORT action is a no-op that yields no proposal.
    pub(crate) fn execute(&mut self, state: &mut S) -> Result<Option<P>> {
        let start = Instant::now();
        let outcome = match &mut self.kind {
            ActionKind::Effect(behavior) => behavior(state),
            ActionKind::Deploy(deployer) => match deployer.take() {
                Some(deploy) => {
                    let (goal, proposal) = deploy(&*state);
                    self.deployment = Some(goal);
                    Ok(Some(proposal))
                }
                None => Ok(None),
            },
            ActionKind::Abort => Ok(None),
        };
        self.invocations += 1;
        self.total_runtime += start.elapsed();
        self.completed = match (&outcome, &self.until) {
            (Ok(_), Some(done)) => done(state),
            _ => true,
        };
        outcome
    }

    /// The goal built by the last execution of a deploy action.
    pub(crate) fn take_deployment(&mut self) -> Option<GoalStructure<S, P>> {
        self.deployment.take()
    }

    fn rearm(&mut self) {
        self.completed = false;
    }
}

/// Combinators available to tactics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacticCombinator {
    /// Children run strictly left to right, one completed action at a time.
    Seq,
    /// The first child (in order) with an enabled action is used.
    FirstOf,
    /// Any child with an enabled action may be used.
    AnyOf,
}

impl TacticCombinator {
    pub fn label(self) -> &'static str {
        match self {
            Self::Seq => "SEQ",
            Self::FirstOf => "FIRSTOF",
            Self::AnyOf => "ANYOF",
        }
    }
}

/// Tree-shaped tactic builder.
pub enum Tactic<S, P> {
    Primitive(Action<S, P>),
    Combinator(TacticCombinator, Vec<Tactic<S, P>>),
}

impl<S, P> fmt::Debug for Tactic<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(action) => fmt::Debug::fmt(action, f),
            Self::Combinator(kind, children) => f
                .debug_tuple(kind.label())
                .field(&children.len())
                .finish(),
        }
    }
}

/// Stable handle of a node inside a [`TacticTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TacticId(usize);

enum TacticNode<S, P> {
    Primitive(Action<S, P>),
    Combinator {
        kind: TacticCombinator,
        children: Vec<TacticId>,
    },
}

struct TacticEntry<S, P> {
    node: TacticNode<S, P>,
    parent: Option<TacticId>,
}

/// Arena form of a tactic, owned by exactly one goal.
pub struct TacticTree<S, P> {
    entries: Vec<TacticEntry<S, P>>,
    root: TacticId,
    cursor: TacticId,
}

impl<S, P> fmt::Debug for TacticTree<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TacticTree")
            .field("nodes", &self.entries.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl<S, P> From<Tactic<S, P>> for TacticTree<S, P> {
    fn from(tactic: Tactic<S, P>) -> Self {
        let mut entries = Vec::new();
        let root = flatten(tactic, None, &mut entries);
        Self {
            entries,
            root,
            cursor: root,
        }
    }
}

fn flatten<S, P>(
    tactic: Tactic<S, P>,
    parent: Option<TacticId>,
    entries: &mut Vec<TacticEntry<S, P>>,
) -> TacticId {
    let id = TacticId(entries.len());
    match tactic {
        Tactic::Primitive(action) => entries.push(TacticEntry {
            node: TacticNode::Primitive(action),
            parent,
        }),
        Tactic::Combinator(kind, subtactics) => {
            entries.push(TacticEntry {
                node: TacticNode::Combinator {
                    kind,
                    children: Vec::new(),
                },
                parent,
            });
            let ids: Vec<TacticId> = subtactics
                .into_iter()
                .map(|sub| flatten(sub, Some(id), entries))
                .collect();
            if let TacticNode::Combinator { children, .. } = &mut entries[id.0].node {
                *children = ids;
            }
        }
    }
    id
}

impl<S, P> TacticTree<S, P> {
    pub fn root(&self) -> TacticId {
        self.root
    }

    /// The subtree the next tick searches for enabled actions.
    pub fn cursor(&self) -> TacticId {
        self.cursor
    }

    /// Reject combinators without children.
    pub fn validate(&self, goal: &str) -> Result<(), GoalTreeError> {
        for entry in &self.entries {
            if let TacticNode::Combinator { kind, children } = &entry.node {
                if children.is_empty() {
                    return Err(GoalTreeError::EmptyTactic {
                        goal: goal.to_string(),
                        combinator: kind.label(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn action(&self, id: TacticId) -> Option<&Action<S, P>> {
        match &self.entries.get(id.0)?.node {
            TacticNode::Primitive(action) => Some(action),
            TacticNode::Combinator { .. } => None,
        }
    }

    pub(crate) fn action_mut(&mut self, id: TacticId) -> Option<&mut Action<S, P>> {
        match &mut self.entries.get_mut(id.0)?.node {
            TacticNode::Primitive(action) => Some(action),
            TacticNode::Combinator { .. } => None,
        }
    }

    /// All actions in declaration order.
    pub fn actions(&self) -> impl Iterator<Item = &Action<S, P>> + '_ {
        self.entries.iter().filter_map(|entry| match &entry.node {
            TacticNode::Primitive(action) => Some(action),
            TacticNode::Combinator { .. } => None,
        })
    }

    pub fn total_invocations(&self) -> u32 {
        self.actions().map(Action::invocations).sum()
    }

    /// Actions under the cursor whose guards hold on `state`.
    ///
    /// FIRSTOF keeps only its first child with an enabled action, ANYOF
    /// offers all of them, and SEQ only looks at its first child: later SEQ
    /// children are reached by moving the cursor after completion.
    pub fn enabled_actions(&self, state: &S) -> Vec<TacticId> {
        let mut found = Vec::new();
        self.collect_enabled(self.cursor, state, &mut found);
        found
    }

    fn collect_enabled(&self, id: TacticId, state: &S, found: &mut Vec<TacticId>) {
        match &self.entries[id.0].node {
            TacticNode::Primitive(action) => {
                if action.is_enabled(state) {
                    found.push(id);
                }
            }
            TacticNode::Combinator { kind, children } => match kind {
                TacticCombinator::FirstOf => {
                    for child in children {
                        self.collect_enabled(*child, state, found);
                        if !found.is_empty() {
                            return;
                        }
                    }
                }
                TacticCombinator::AnyOf => {
                    for child in children {
                        self.collect_enabled(*child, state, found);
                    }
                }
                TacticCombinator::Seq => {
                    if let Some(first) = children.first() {
                        self.collect_enabled(*first, state, found);
                    }
                }
            },
        }
    }

    /// Move the cursor after `executed` ran: stay on an unfinished persistent
    /// action, otherwise continue with the next SEQ sibling or fall back to
    /// the root.
    pub(crate) fn advance(&mut self, executed: TacticId) {
        self.cursor = self.next_after(executed).unwrap_or(self.root);
    }

    fn next_after(&self, id: TacticId) -> Option<TacticId> {
        let entry = &self.entries[id.0];
        if let TacticNode::Primitive(action) = &entry.node {
            if !action.is_completed() {
                return Some(id);
            }
        }
        let parent = entry.parent?;
        match &self.entries[parent.0].node {
            TacticNode::Combinator {
                kind: TacticCombinator::Seq,
                children,
            } => {
                let position = children.iter().position(|child| *child == id)?;
                match children.get(position + 1) {
                    Some(next) => Some(*next),
                    None => self.next_after(parent),
                }
            }
            TacticNode::Combinator { .. } => self.next_after(parent),
            TacticNode::Primitive(_) => None,
        }
    }

    /// Return to the initial condition: cursor at the root and every action
    /// not yet completed. Statistics are kept.
    pub(crate) fn reset(&mut self) {
        self.cursor = self.root;
        for entry in &mut self.entries {
            if let TacticNode::Primitive(action) = &mut entry.node {
                action.rearm();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Tree = TacticTree<i32, i32>;

    fn act(name: &str) -> Action<i32, i32> {
        Action::new(name).do1(|s: &mut i32| {
            *s += 1;
            Some(*s)
        })
    }

    fn names(tree: &Tree, ids: &[TacticId]) -> Vec<String> {
        ids.iter()
            .map(|id| tree.action(*id).expect("action").name().to_string())
            .collect()
    }

    #[test]
    fn first_of_picks_first_enabled_child() {
        let tree: Tree = Tactic::Combinator(
            TacticCombinator::FirstOf,
            vec![
                act("a").on(|s: &i32| *s > 10).lift(),
                act("b").lift(),
                act("c").lift(),
            ],
        )
        .into();
        assert_eq!(names(&tree, &tree.enabled_actions(&0)), vec!["b"]);
        assert_eq!(names(&tree, &tree.enabled_actions(&11)), vec!["a"]);
    }

    #[test]
    fn any_of_offers_all_enabled_children() {
        let tree: Tree = Tactic::Combinator(
            TacticCombinator::AnyOf,
            vec![
                act("a").lift(),
                act("b").on(|s: &i32| *s < 0).lift(),
                act("c").lift(),
            ],
        )
        .into();
        assert_eq!(names(&tree, &tree.enabled_actions(&0)), vec!["a", "c"]);
    }

    #[test]
    fn all_guards_must_hold() {
        let action = act("a").on(|s: &i32| *s > 0).on(|s: &i32| *s < 5);
        assert!(action.is_enabled(&3));
        assert!(!action.is_enabled(&7));
        assert!(!action.is_enabled(&0));
    }

    #[test]
    fn seq_advances_left_to_right_then_wraps_to_root() {
        let mut tree: Tree =
            Tactic::Combinator(TacticCombinator::Seq, vec![act("a").lift(), act("b").lift()])
                .into();
        let mut state = 0;

        let first = tree.enabled_actions(&state);
        assert_eq!(names(&tree, &first), vec!["a"]);
        tree.action_mut(first[0])
            .expect("a")
            .execute(&mut state)
            .expect("run a");
        tree.advance(first[0]);

        let second = tree.enabled_actions(&state);
        assert_eq!(names(&tree, &second), vec!["b"]);
        tree.action_mut(second[0])
            .expect("b")
            .execute(&mut state)
            .expect("run b");
        tree.advance(second[0]);

        assert_eq!(tree.cursor(), tree.root());
    }

    #[test]
    fn persistent_action_stays_current_until_done() {
        let mut tree: Tree = Tactic::Combinator(
            TacticCombinator::Seq,
            vec![act("grow").until(|s: &i32| *s >= 3).lift(), act("next").lift()],
        )
        .into();
        let mut state = 0;

        for expected in ["grow", "grow", "grow", "next"] {
            let enabled = tree.enabled_actions(&state);
            assert_eq!(names(&tree, &enabled), vec![expected]);
            tree.action_mut(enabled[0])
                .expect("action")
                .execute(&mut state)
                .expect("run");
            tree.advance(enabled[0]);
        }
        assert_eq!(state, 4);
    }

    #[test]
    fn failing_behavior_reports_error_and_counts_invocation() {
        let mut action: Action<i32, i32> =
            Action::new("boom").do_try(|_| Err(anyhow::anyhow!("boom")));
        let mut state = 0;
        assert!(action.execute(&mut state).is_err());
        assert_eq!(action.invocations(), 1);
        assert!(action.is_completed());
    }

    #[test]
    fn deploy_runs_once_and_survives_reset() {
        let mut tree: Tree = Tactic::Combinator(
            TacticCombinator::FirstOf,
            vec![
                Action::deploy("spawn", |s: &i32| {
                    crate::core::goal::GoalNode::new(format!("after {s}"))
                        .to_solve(|_: &i32| true)
                        .with_tactic(act("a").lift())
                        .lift()
                })
                .lift(),
                act("fallback").lift(),
            ],
        )
        .into();
        let mut state = 7;

        let first = tree.enabled_actions(&state);
        assert_eq!(names(&tree, &first), vec!["spawn"]);
        let action = tree.action_mut(first[0]).expect("spawn");
        assert!(action.is_deploy());
        assert_eq!(action.execute(&mut state).expect("run"), Some(0));
        let deployed = action.take_deployment().expect("deployed goal");
        assert_eq!(deployed.label(), "after 7");
        assert!(action.take_deployment().is_none());

        tree.reset();
        assert_eq!(names(&tree, &tree.enabled_actions(&state)), vec!["fallback"]);
    }

    #[test]
    fn reset_rearms_actions_and_cursor() {
        let mut tree: Tree =
            Tactic::Combinator(TacticCombinator::Seq, vec![act("a").lift(), act("b").lift()])
                .into();
        let mut state = 0;
        let first = tree.enabled_actions(&state)[0];
        tree.action_mut(first)
            .expect("a")
            .execute(&mut state)
            .expect("run");
        tree.advance(first);
        tree.reset();
        assert_eq!(tree.cursor(), tree.root());
        assert!(!tree.action(first).expect("a").is_completed());
        assert_eq!(tree.total_invocations(), 1);
    }

    #[test]
    fn empty_combinator_is_rejected() {
        let tree: Tree = Tactic::Combinator(TacticCombinator::AnyOf, Vec::new()).into();
        assert_eq!(
            tree.validate("g"),
            Err(GoalTreeError::EmptyTactic {
                goal: "g".to_string(),
                combinator: "ANYOF",
            })
        );
    }
}
