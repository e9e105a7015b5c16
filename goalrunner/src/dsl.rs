//! Short constructors for goal and tactic trees.
//!
//! ```
//! use goalrunner::dsl::{action, goal, seq};
//!
//! let count: goalrunner::GoalStructure<i32, i32> = seq(vec![
//!     goal("reach 1")
//!         .to_solve(|p: &i32| *p == 1)
//!         .with_tactic(action("inc").do1(|s: &mut i32| { *s += 1; Some(*s) }).lift())
//!         .lift(),
//!     goal("reach 2")
//!         .to_solve(|p: &i32| *p == 2)
//!         .with_tactic(action("inc").do1(|s: &mut i32| { *s += 1; Some(*s) }).lift())
//!         .lift(),
//! ]);
//! assert_eq!(count.label(), "SEQ");
//! ```
//!
//! The derived shapes at the bottom ([`success`], [`fail`], [`lift`],
//! [`while_do`], [`if_else`], [`deploy_once`]) are plain compositions of SEQ,
//! FIRSTOF, REPEAT and ABORT. They judge the agent state rather than a
//! proposal, so their actions propose `P::default()`.

use crate::core::goal::{GoalNode, GoalStructure, GoalsCombinator};
use crate::core::tactic::{Action, Tactic, TacticCombinator};

pub fn goal<S: 'static, P: 'static>(name: impl Into<String>) -> GoalNode<S, P> {
    GoalNode::new(name)
}

/// A goal that must be given an oracle before an agent accepts it.
pub fn test_goal<S: 'static, P: 'static>(name: impl Into<String>) -> GoalNode<S, P> {
    GoalNode::test_goal(name)
}

pub fn action<S: 'static, P: 'static>(name: impl Into<String>) -> Action<S, P> {
    Action::new(name)
}

/// The ABORT tactic.
pub fn abort<S: 'static, P: 'static>() -> Tactic<S, P> {
    Action::abort().lift()
}

pub fn seq<S, P>(children: Vec<GoalStructure<S, P>>) -> GoalStructure<S, P> {
    GoalStructure::combinator(GoalsCombinator::Seq, children)
}

pub fn first_of<S, P>(children: Vec<GoalStructure<S, P>>) -> GoalStructure<S, P> {
    GoalStructure::combinator(GoalsCombinator::FirstOf, children)
}

pub fn repeat<S, P>(child: GoalStructure<S, P>) -> GoalStructure<S, P> {
    GoalStructure::combinator(GoalsCombinator::Repeat, vec![child])
}

pub fn seq_tactic<S, P>(children: Vec<Tactic<S, P>>) -> Tactic<S, P> {
    Tactic::Combinator(TacticCombinator::Seq, children)
}

pub fn first_of_tactic<S, P>(children: Vec<Tactic<S, P>>) -> Tactic<S, P> {
    Tactic::Combinator(TacticCombinator::FirstOf, children)
}

pub fn any_of<S, P>(children: Vec<Tactic<S, P>>) -> Tactic<S, P> {
    Tactic::Combinator(TacticCombinator::AnyOf, children)
}

/// Succeeds on its first tick.
pub fn success<S: 'static, P: Default + 'static>(name: impl Into<String>) -> GoalStructure<S, P> {
    goal(name)
        .to_solve(|_: &P| true)
        .with_tactic(action("succeed").do1(|_: &mut S| Some(P::default())).lift())
        .lift()
}

/// Fails on its first tick, through ABORT.
pub fn fail<S: 'static, P: 'static>(name: impl Into<String>) -> GoalStructure<S, P> {
    goal(name).to_solve(|_: &P| false).with_tactic(abort()).lift()
}

/// Succeeds if `predicate` holds on the state when the goal is tried,
/// fails otherwise.
pub fn lift<S, P, F>(name: impl Into<String>, predicate: F) -> GoalStructure<S, P>
where
    S: 'static,
    P: Default + 'static,
    F: Fn(&S) -> bool + Send + 'static,
{
    goal(name)
        .to_solve(|_: &P| true)
        .with_tactic(first_of_tactic(vec![
            action("check")
                .on(predicate)
                .do1(|_: &mut S| Some(P::default()))
                .lift(),
            abort(),
        ]))
        .lift()
}

/// While `guard` holds, keep trying `body`. Ends once `guard` is false or
/// `body` succeeds. Only an enclosing budget can make it fail.
///
/// `REPEAT(FIRSTOF(not guard, body))`
pub fn while_do<S, P, F>(guard: F, body: GoalStructure<S, P>) -> GoalStructure<S, P>
where
    S: 'static,
    P: Default + 'static,
    F: Fn(&S) -> bool + Send + 'static,
{
    let negated = lift("guard no longer holds", move |state: &S| !guard(state));
    repeat(first_of(vec![negated, body]))
}

/// `FIRSTOF(SEQ(condition, then), otherwise)`
///
/// Note that `otherwise` also runs when `condition` held but `then` failed.
pub fn if_else<S, P, F>(
    condition: F,
    then: GoalStructure<S, P>,
    otherwise: GoalStructure<S, P>,
) -> GoalStructure<S, P>
where
    S: 'static,
    P: Default + 'static,
    F: Fn(&S) -> bool + Send + 'static,
{
    first_of(vec![seq(vec![lift("condition holds", condition), then]), otherwise])
}

/// Builds a goal from the state at the moment it is tried and inserts it
/// right after itself, then succeeds. It deploys at most once; tried again,
/// e.g. under a REPEAT, it fails.
///
/// `SEQ(deploy once)`, so the deployed goal always has a SEQ to join.
pub fn deploy_once<S, P, F>(build: F) -> GoalStructure<S, P>
where
    S: 'static,
    P: Default + 'static,
    F: FnOnce(&S) -> GoalStructure<S, P> + Send + 'static,
{
    let deploying = goal("deploy once")
        .to_solve(|_: &P| true)
        .with_tactic(first_of_tactic(vec![
            Action::deploy("deploy a goal", build).lift(),
            abort(),
        ]))
        .lift();
    seq(vec![deploying])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::core::status::{FailureReason, ProgressStatus};

    fn run(agent: &mut Agent<i32, i32>, max_ticks: usize) -> Option<ProgressStatus> {
        for _ in 0..max_ticks {
            if let Some(status) = agent.update().expect("tick").concluded() {
                return Some(status);
            }
        }
        None
    }

    fn bump(name: &str, target: i32) -> GoalStructure<i32, i32> {
        goal(name)
            .to_solve(move |p: &i32| *p >= target)
            .with_tactic(
                action("bump")
                    .do1(|s: &mut i32| {
                        *s += 1;
                        Some(*s)
                    })
                    .lift(),
            )
            .lift()
    }

    #[test]
    fn success_and_fail_conclude_in_one_tick() {
        let mut agent = Agent::new("a").attach_state(0);
        agent.set_goal(success("ok")).expect("goal");
        assert_eq!(run(&mut agent, 1), Some(ProgressStatus::Success));

        agent.set_goal(fail("nope")).expect("goal");
        assert_eq!(run(&mut agent, 1), Some(ProgressStatus::Failed));
        let handled = agent.last_handled_goal().expect("handled");
        assert_eq!(handled.failure_reason(handled.root()), Some(&FailureReason::Aborted));
    }

    #[test]
    fn lift_judges_the_state() {
        let mut agent = Agent::new("a").attach_state(3);
        agent.set_goal(lift("positive", |s: &i32| *s > 0)).expect("goal");
        assert_eq!(run(&mut agent, 1), Some(ProgressStatus::Success));

        agent.set_goal(lift("negative", |s: &i32| *s < 0)).expect("goal");
        assert_eq!(run(&mut agent, 2), Some(ProgressStatus::Failed));
    }

    #[test]
    fn while_do_stops_when_guard_breaks() {
        let mut agent = Agent::new("a").attach_state(0);
        // body never succeeds on its own; each try bumps once then aborts
        let body = goal("unreachable")
            .to_solve(|_: &i32| false)
            .with_tactic(seq_tactic(vec![
                action("bump")
                    .do1(|s: &mut i32| {
                        *s += 1;
                        Some(*s)
                    })
                    .lift(),
                abort(),
            ]))
            .lift();
        agent.set_goal(while_do(|s: &i32| *s < 3, body)).expect("goal");
        assert_eq!(run(&mut agent, 50), Some(ProgressStatus::Success));
        assert_eq!(agent.state(), Some(&3));
    }

    #[test]
    fn if_else_takes_the_matching_branch() {
        let mut agent = Agent::new("a").attach_state(0);
        agent
            .set_goal(if_else(|s: &i32| *s > 10, bump("then", 100), bump("else", 2)))
            .expect("goal");
        assert_eq!(run(&mut agent, 10), Some(ProgressStatus::Success));
        assert_eq!(agent.state(), Some(&2));

        agent.set_goal(if_else(|s: &i32| *s == 2, bump("then", 4), fail("else"))).expect("goal");
        assert_eq!(run(&mut agent, 10), Some(ProgressStatus::Success));
        assert_eq!(agent.state(), Some(&4));
    }

    #[test]
    fn deploy_once_inserts_a_goal_built_from_the_state() {
        let mut agent = Agent::new("a").attach_state(0);
        agent
            .set_goal(seq(vec![
                bump("reach 3", 3),
                deploy_once(|s: &i32| bump("three more", *s + 3)),
            ]))
            .expect("goal");
        assert_eq!(run(&mut agent, 20), Some(ProgressStatus::Success));
        assert_eq!(agent.state(), Some(&6));
        let handled = agent.last_handled_goal().expect("handled");
        assert_eq!(handled.outline(), "SEQ(reach 3, SEQ(deploy once, three more))");
    }

    #[test]
    fn tactic_combinators_label_their_nodes() {
        let tactic: Tactic<i32, i32> = any_of(vec![action("a").lift(), abort()]);
        assert!(matches!(
            tactic,
            Tactic::Combinator(TacticCombinator::AnyOf, ref c) if c.len() == 2
        ));
        assert_eq!(first_of::<i32, i32>(vec![success("x")]).label(), "FIRSTOF");
        assert_eq!(repeat::<i32, i32>(success("x")).label(), "REPEAT");
    }
}
