//! Threaded loop tests: pause, resume, stop, message wake-ups and router
//! membership.
//!
//! Timing assertions use generous timeouts. Where a test checks that a
//! message cut a sleep short, the sampling interval is far longer than the
//! timeout, so only a wake-up can make the assertion pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use goalrunner::comms::{CastKind, Message, Router};
use goalrunner::dsl::{action, goal};
use goalrunner::test_support::{Counter, reach_goal};
use goalrunner::{
    Agent, AutonomousAgent, FailureReason, GoalStructure, LoopState, LoopStop, ProgressStatus,
};

const PATIENCE: Duration = Duration::from_secs(5);

fn autonomous(id: &str, interval: Duration) -> AutonomousAgent<Counter, i32> {
    let mut agent = AutonomousAgent::new(Agent::new(id).attach_state(Counter::default()));
    agent.set_sampling_interval(interval);
    agent
}

/// A goal that never succeeds and counts its ticks in `ticks`.
fn counting_forever(ticks: Arc<AtomicU32>) -> GoalStructure<Counter, i32> {
    goal("forever")
        .to_solve(|_: &i32| false)
        .with_tactic(
            action("count")
                .do1(move |s: &mut Counter| {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    s.value += 1;
                    Some(s.value)
                })
                .lift(),
        )
        .lift()
}

/// Poll until `ticks` reached `count`, for at most `PATIENCE`.
fn wait_for_ticks(ticks: &AtomicU32, count: u32) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while ticks.load(Ordering::SeqCst) < count {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

#[test]
fn message_cuts_the_sampling_sleep_short() {
    let agent = autonomous("sleeper", Duration::from_secs(600));
    agent.set_goal(reach_goal(2)).expect("goal");
    let (handle, join) = agent.spawn().expect("spawn");

    // First tick runs at once, then the loop sleeps for ten minutes.
    assert!(handle.wait_for_state(LoopState::Running, PATIENCE));
    assert!(
        handle
            .wait_until_the_goal_is_concluded_timeout(Duration::from_millis(200))
            .is_none()
    );

    let started = Instant::now();
    assert!(handle.send_message_to_this_agent(Message::single("tester", "sleeper", "wake up")));
    let report = handle
        .wait_until_the_goal_is_concluded_timeout(PATIENCE)
        .expect("concluded after wake-up");
    assert!(started.elapsed() < PATIENCE);
    assert_eq!(report.status, ProgressStatus::Success);
    assert_eq!(handle.mailbox().size(), 1);

    handle.stop();
    let outcome = join.join().expect("join");
    assert!(matches!(outcome.stop, LoopStop::Stopped));
}

#[test]
fn paused_agent_ticks_as_soon_as_a_message_arrives() {
    let ticks = Arc::new(AtomicU32::new(0));
    let agent = autonomous("worker", Duration::from_secs(600));
    agent.set_goal(counting_forever(Arc::clone(&ticks))).expect("goal");
    let (handle, join) = agent.spawn().expect("spawn");

    // First tick runs at once, then the loop sleeps for ten minutes.
    assert!(wait_for_ticks(&ticks, 1));
    handle.pause();
    assert!(handle.wait_for_state(LoopState::Paused, PATIENCE));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(ticks.load(Ordering::SeqCst), 1);

    let started = Instant::now();
    assert!(handle.send_message_to_this_agent(Message::single("boss", "worker", "go on")));
    assert!(wait_for_ticks(&ticks, 2));
    assert!(started.elapsed() < PATIENCE);
    assert_eq!(ticks.load(Ordering::SeqCst), 2);

    handle.stop();
    let report = handle.wait_until_the_goal_is_concluded().expect("report");
    assert_eq!(report.status, ProgressStatus::Failed);
    assert_eq!(report.failure, Some(FailureReason::Stopped));
    join.join().expect("join");
    assert_eq!(handle.loop_state(), LoopState::Stopped);
}

#[test]
fn pause_and_resume_from_the_handle() {
    let ticks = Arc::new(AtomicU32::new(0));
    let agent = autonomous("worker", Duration::from_millis(10));
    agent.set_goal(counting_forever(Arc::clone(&ticks))).expect("goal");
    let (handle, join) = agent.spawn().expect("spawn");

    handle.pause();
    assert!(handle.wait_for_state(LoopState::Paused, PATIENCE));
    handle.resume();
    assert!(handle.wait_for_state(LoopState::Running, PATIENCE));

    // stop also ends a paused loop
    handle.pause();
    assert!(handle.wait_for_state(LoopState::Paused, PATIENCE));
    handle.stop();
    let outcome = join.join().expect("join");
    assert!(matches!(outcome.stop, LoopStop::Stopped));
    assert_eq!(outcome.goals_concluded, 1);
    assert_eq!(u64::from(ticks.load(Ordering::SeqCst)), outcome.ticks);
}

#[test]
fn new_goal_wakes_an_idle_loop() {
    let (handle, join) = autonomous("idle", Duration::from_secs(600))
        .spawn()
        .expect("spawn");
    assert!(handle.wait_for_state(LoopState::WaitingForGoal, PATIENCE));

    handle.set_goal(reach_goal(1)).expect("goal");
    let report = handle
        .wait_until_the_goal_is_concluded_timeout(PATIENCE)
        .expect("report");
    assert_eq!(report.status, ProgressStatus::Success);
    assert_eq!(report.label, "reach 1");

    handle.stop();
    join.join().expect("join");
}

#[test]
fn routed_messages_wake_registered_agents() {
    let router = Arc::new(Router::new());
    let mut sender = autonomous("alice", Duration::from_secs(600));
    sender.register_to(Arc::clone(&router));
    let messenger = sender.messenger().expect("registered");

    let mut receiver = AutonomousAgent::new(
        Agent::new("bob")
            .with_role("worker")
            .attach_state(Counter::default()),
    );
    receiver.set_sampling_interval(Duration::from_secs(600));
    receiver.register_to(Arc::clone(&router));
    receiver.set_goal(reach_goal(2)).expect("goal");
    let (handle, join) = receiver.spawn().expect("spawn");
    assert!(handle.wait_for_state(LoopState::Running, PATIENCE));

    let ack = messenger.send(CastKind::Role, "worker", "ping", vec![serde_json::json!(1)]);
    assert!(ack.is_success());
    let report = handle
        .wait_until_the_goal_is_concluded_timeout(PATIENCE)
        .expect("woken by routed message");
    assert_eq!(report.status, ProgressStatus::Success);
    let received = handle.mailbox().retrieve(|m| m.name() == "ping").expect("delivered");
    assert_eq!(received.source(), "alice");

    assert!(
        messenger
            .send(CastKind::Single, "carol", "hello", Vec::new())
            .is_rejected()
    );

    handle.stop();
    join.join().expect("join");
    assert!(!router.is_registered("bob"));
    assert!(router.is_registered("alice"));
}

#[test]
fn dropping_an_agent_that_never_looped_leaves_the_router() {
    let router = Arc::new(Router::new());
    let mut sender = autonomous("alice", Duration::from_secs(600));
    sender.register_to(Arc::clone(&router));
    let messenger = sender.messenger().expect("registered");

    let mut idle = autonomous("bob", Duration::from_secs(600));
    idle.register_to(Arc::clone(&router));
    assert!(messenger.send(CastKind::Single, "bob", "hi", Vec::new()).is_success());

    drop(idle);
    assert!(!router.is_registered("bob"));
    assert!(
        messenger
            .send(CastKind::Single, "bob", "hi again", Vec::new())
            .is_rejected()
    );
}

#[test]
fn registering_again_moves_the_agent_to_the_new_router() {
    let first = Arc::new(Router::new());
    let second = Arc::new(Router::new());
    let mut agent = autonomous("nomad", Duration::from_secs(600));
    agent.register_to(Arc::clone(&first));
    agent.register_to(Arc::clone(&second));
    assert!(!first.is_registered("nomad"));
    assert!(second.is_registered("nomad"));
}

#[test]
fn action_error_stops_the_loop_and_fails_the_goal() {
    let agent = autonomous("fragile", Duration::from_millis(5));
    let broken = goal("broken")
        .to_solve(|_: &i32| true)
        .with_tactic(
            action("explode")
                .do_try(|_: &mut Counter| Err(anyhow::anyhow!("sensor offline")))
                .lift(),
        )
        .lift();
    agent.set_goal(broken).expect("goal");
    let (handle, join) = agent.spawn().expect("spawn");

    let report = handle
        .wait_until_the_goal_is_concluded_timeout(PATIENCE)
        .expect("report");
    assert_eq!(report.status, ProgressStatus::Failed);
    assert!(matches!(report.failure, Some(FailureReason::Explicit(_))));
    let outcome = join.join().expect("join");
    assert!(matches!(outcome.stop, LoopStop::ActionFailed(_)));
    assert!(handle.has_exited());
}
