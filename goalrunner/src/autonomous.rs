//! Agents that run their own tick loop, usually on a dedicated thread.
//!
//! The loop is driven through an [`AgentHandle`]: pause, resume, stop, new
//! goals and incoming messages all reach it through one wake channel, so a
//! sleeping loop reacts immediately instead of after its sampling interval.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::agent::{Agent, TickOutcome};
use crate::comms::mailbox::Mailbox;
use crate::comms::message::Message;
use crate::comms::messenger::Messenger;
use crate::comms::router::{Registration, Router};
use crate::config::AgentConfig;
use crate::core::budget::is_valid_amount;
use crate::core::goal::GoalStructure;
use crate::core::goal_tree::GoalTree;
use crate::core::report::GoalReport;
use crate::core::status::FailureReason;
use crate::error::{AgentError, GoalTreeError};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    WaitingForGoal,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum Wake {
    Command,
    Message,
    Goal,
}

/// Cross-thread command register plus the wake channel of one loop.
pub(crate) struct Control {
    command: Mutex<Option<Command>>,
    wake: Sender<Wake>,
}

impl Control {
    fn new() -> (Arc<Self>, Receiver<Wake>) {
        let (wake, wake_rx) = mpsc::channel();
        let control = Self {
            command: Mutex::new(None),
            wake,
        };
        (Arc::new(control), wake_rx)
    }

    fn command(&self) -> MutexGuard<'_, Option<Command>> {
        self.command.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<Command> {
        *self.command()
    }

    /// Takes effect between ticks: a sleeping loop is woken to notice it.
    fn pause(&self) {
        {
            let mut command = self.command();
            if *command == Some(Command::Stop) {
                return;
            }
            *command = Some(Command::Pause);
        }
        self.wake(Wake::Command);
    }

    fn resume(&self) {
        self.clear_pause();
        self.wake(Wake::Command);
    }

    fn stop(&self) {
        *self.command() = Some(Command::Stop);
        self.wake(Wake::Command);
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.current() == Some(Command::Stop)
    }

    /// A message arrived: clear a pending pause and wake the loop.
    pub(crate) fn notify_message(&self) {
        self.clear_pause();
        self.wake(Wake::Message);
    }

    fn clear_pause(&self) {
        let mut command = self.command();
        if *command == Some(Command::Pause) {
            *command = None;
        }
    }

    fn wake(&self, reason: Wake) {
        // The receiver is gone once the loop exited.
        let _ = self.wake.send(reason);
    }
}

struct PendingGoal<S, P> {
    tree: GoalTree<S, P>,
    budget: Option<f64>,
    seq: u64,
}

/// Goal bookkeeping shared with handles. Goals are numbered in submission
/// order; `concluded` is the number of the last one that finished.
#[derive(Default)]
struct Ledger {
    submitted: u64,
    concluded: u64,
    last_report: Option<GoalReport>,
    state: LoopState,
    exited: bool,
}

struct Shared<S, P> {
    pending: Mutex<Option<PendingGoal<S, P>>>,
    ledger: Mutex<Ledger>,
    changed: Condvar,
    has_state: bool,
    has_collector: bool,
}

impl<S, P> Shared<S, P> {
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingGoal<S, P>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_ledger(&self, change: impl FnOnce(&mut Ledger)) {
        change(&mut self.ledger());
        self.changed.notify_all();
    }
}

/// Validate a goal on the caller's thread and queue it for the loop.
fn submit_goal<S, P>(
    agent_id: &str,
    shared: &Shared<S, P>,
    control: &Control,
    goal: GoalStructure<S, P>,
    budget: Option<f64>,
) -> Result<(), AgentError> {
    if !shared.has_state {
        return Err(AgentError::NoState {
            agent: agent_id.to_string(),
        });
    }
    if let Some(budget) = budget {
        if !is_valid_amount(budget) {
            return Err(GoalTreeError::InvalidInitialBudget(budget).into());
        }
    }
    let tree = GoalTree::new(goal)?;
    if !shared.has_collector {
        if let Some(goal) = tree.oracle_goals().next() {
            return Err(AgentError::MissingDataCollector {
                agent: agent_id.to_string(),
                goal: goal.name().to_string(),
            });
        }
    }
    let seq = {
        let mut ledger = shared.ledger();
        ledger.submitted += 1;
        ledger.submitted
    };
    *shared.pending() = Some(PendingGoal { tree, budget, seq });
    debug!(agent = agent_id, seq, "goal submitted");
    control.wake(Wake::Goal);
    Ok(())
}

/// Why [`AutonomousAgent::run_loop`] returned.
#[derive(Debug)]
pub enum LoopStop {
    /// `stop()` was called.
    Stopped,
    /// An action failed; the loop does not retry.
    ActionFailed(AgentError),
}

/// Summary of a finished loop.
#[derive(Debug)]
pub struct LoopOutcome {
    pub agent: String,
    /// Ticks that executed an action.
    pub ticks: u64,
    pub goals_concluded: u32,
    pub stop: LoopStop,
}

/// An [`Agent`] plus the machinery to run it unattended.
pub struct AutonomousAgent<S, P> {
    agent: Agent<S, P>,
    sampling_interval: Duration,
    control: Arc<Control>,
    wake_rx: Receiver<Wake>,
    shared: Arc<Shared<S, P>>,
    mailbox: Arc<Mailbox>,
    registration: Option<Registration>,
    running_seq: u64,
}

impl<S, P> fmt::Debug for AutonomousAgent<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutonomousAgent")
            .field("agent", &self.agent)
            .field("sampling_interval", &self.sampling_interval)
            .field("mailbox", &self.mailbox.size())
            .field("registered", &self.registration.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, P> AutonomousAgent<S, P> {
    pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(1000);

    /// Wrap an agent. Its state and data collector must already be attached.
    pub fn new(agent: Agent<S, P>) -> Self {
        let (control, wake_rx) = Control::new();
        let shared = Shared {
            pending: Mutex::new(None),
            ledger: Mutex::new(Ledger::default()),
            changed: Condvar::new(),
            has_state: agent.state().is_some(),
            has_collector: agent.has_data_collector(),
        };
        Self {
            agent,
            sampling_interval: Self::DEFAULT_SAMPLING_INTERVAL,
            control,
            wake_rx,
            shared: Arc::new(shared),
            mailbox: Arc::new(Mailbox::new()),
            registration: None,
            running_seq: 0,
        }
    }

    /// Apply the sampling interval and the agent settings of a config.
    pub fn with_config(mut self, config: &AgentConfig) -> Result<Self, AgentError> {
        self.agent = self.agent.with_config(config)?;
        self.sampling_interval = Duration::from_millis(config.sampling_interval_ms);
        Ok(self)
    }

    pub fn set_sampling_interval(&mut self, interval: Duration) {
        self.sampling_interval = interval;
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    pub fn agent(&self) -> &Agent<S, P> {
        &self.agent
    }

    pub fn handle(&self) -> AgentHandle<S, P> {
        AgentHandle {
            id: self.agent.id().to_string(),
            initial_budget: self.agent.initial_budget(),
            control: Arc::clone(&self.control),
            shared: Arc::clone(&self.shared),
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Register with a router under the agent's id and role. Messages routed
    /// to this agent wake its loop.
    ///
    /// The agent stays registered until its loop exits or it is dropped.
    /// Registering again leaves the previous router.
    pub fn register_to(&mut self, router: Arc<Router>) {
        drop(self.registration.take());
        self.registration = Some(Registration::new(
            router,
            self.agent.id(),
            self.agent.role(),
            &self.mailbox,
            &self.control,
        ));
    }

    /// A messaging facade bound to this agent, once it is registered.
    pub fn messenger(&self) -> Option<Messenger> {
        let registration = self.registration.as_ref()?;
        Some(Messenger::new(
            self.agent.id(),
            Arc::clone(&self.mailbox),
            Arc::clone(registration.router()),
        ))
    }

    /// Queue a goal for the loop. Validation happens here, on the caller.
    pub fn set_goal(&self, goal: GoalStructure<S, P>) -> Result<(), AgentError> {
        submit_goal(
            self.agent.id(),
            &self.shared,
            &self.control,
            goal,
            self.agent.initial_budget(),
        )
    }

    pub fn send_message_to_this_agent(&self, message: Message) -> bool {
        deliver_local(&self.control, &self.mailbox, message)
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Run ticks until stopped or an action fails.
    ///
    /// Between ticks the loop waits for the rest of the sampling interval,
    /// or less if woken by a command, a new goal or a message. Once it exits
    /// the open goal, if any, is failed, and the agent leaves its router.
    pub fn run_loop(mut self) -> LoopOutcome {
        let id = self.agent.id().to_string();
        info!(agent = %id, interval_ms = self.sampling_interval.as_millis(), "loop entered");
        let mut ticks = 0u64;
        let mut goals_concluded = 0u32;

        let stop = loop {
            match self.control.current() {
                Some(Command::Stop) => break LoopStop::Stopped,
                Some(Command::Pause) => {
                    if self.set_state(LoopState::Paused) {
                        info!(agent = %id, "loop paused");
                    }
                    self.wait(None);
                    continue;
                }
                None => {}
            }

            self.install_pending_goal();
            if self.agent.goal().is_none() {
                self.set_state(LoopState::WaitingForGoal);
                self.wait(None);
                continue;
            }
            if self.set_state(LoopState::Running) {
                info!(agent = %id, "loop running");
            }

            let started = Instant::now();
            match self.agent.update() {
                Ok(outcome) => {
                    if matches!(outcome, TickOutcome::Executed(_)) {
                        ticks += 1;
                    }
                    if outcome.concluded().is_some() {
                        goals_concluded += 1;
                        self.publish_conclusion();
                    }
                }
                Err(err) => {
                    error!(agent = %id, error = %err, "tick failed");
                    break LoopStop::ActionFailed(err);
                }
            }
            let remaining = self.sampling_interval.saturating_sub(started.elapsed());
            self.wait(Some(remaining));
        };

        let reason = match &stop {
            LoopStop::Stopped => FailureReason::Stopped,
            LoopStop::ActionFailed(err) => FailureReason::Explicit(err.to_string()),
        };
        if self.agent.fail_top_goal(reason).is_some() {
            goals_concluded += 1;
            self.publish_conclusion();
        }
        // leaves the router
        self.registration = None;
        self.set_state(LoopState::Stopped);
        self.shared.update_ledger(|ledger| ledger.exited = true);
        info!(agent = %id, ticks, goals_concluded, "loop exited");

        LoopOutcome {
            agent: id,
            ticks,
            goals_concluded,
            stop,
        }
    }

    /// Block until woken, or until `timeout` elapsed. Wakes that piled up
    /// meanwhile are folded into this one.
    fn wait(&self, timeout: Option<Duration>) {
        let woken = match timeout {
            None => self.wake_rx.recv().ok(),
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => match self.wake_rx.recv_timeout(timeout) {
                Ok(reason) => Some(reason),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
            },
        };
        if let Some(reason) = woken {
            debug!(agent = %self.agent.id(), reason = ?reason, "loop woken");
            while self.wake_rx.try_recv().is_ok() {}
        }
    }

    fn install_pending_goal(&mut self) {
        let Some(pending) = self.shared.pending().take() else {
            return;
        };
        match self.agent.set_goal_tree(pending.tree, pending.budget) {
            Ok(()) => self.running_seq = pending.seq,
            Err(err) => {
                warn!(agent = %self.agent.id(), error = %err, "goal rejected");
                self.shared.update_ledger(|ledger| {
                    ledger.concluded = ledger.concluded.max(pending.seq);
                    ledger.last_report = None;
                });
            }
        }
    }

    fn publish_conclusion(&self) {
        let report = self.agent.last_handled_goal().map(GoalTree::report);
        let seq = self.running_seq;
        self.shared.update_ledger(|ledger| {
            ledger.concluded = ledger.concluded.max(seq);
            ledger.last_report = report;
        });
    }

    /// Returns true if the state changed.
    fn set_state(&self, state: LoopState) -> bool {
        let mut ledger = self.shared.ledger();
        if ledger.state == state {
            return false;
        }
        ledger.state = state;
        drop(ledger);
        self.shared.changed.notify_all();
        true
    }
}

impl<S: Send + 'static, P: Send + 'static> AutonomousAgent<S, P> {
    /// Run the loop on a new named thread.
    pub fn spawn(self) -> std::io::Result<(AgentHandle<S, P>, JoinHandle<LoopOutcome>)> {
        let handle = self.handle();
        let join = thread::Builder::new()
            .name(format!("agent-{}", self.agent.id()))
            .spawn(move || self.run_loop())?;
        Ok((handle, join))
    }
}

fn deliver_local(control: &Control, mailbox: &Mailbox, message: Message) -> bool {
    if control.is_stopping() {
        debug!(name = message.name(), "message dropped: agent is stopping");
        return false;
    }
    mailbox.put(message);
    control.notify_message();
    true
}

/// Cloneable, thread-safe remote control of an [`AutonomousAgent`].
pub struct AgentHandle<S, P> {
    id: String,
    initial_budget: Option<f64>,
    control: Arc<Control>,
    shared: Arc<Shared<S, P>>,
    mailbox: Arc<Mailbox>,
}

impl<S, P> Clone for AgentHandle<S, P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            initial_budget: self.initial_budget,
            control: Arc::clone(&self.control),
            shared: Arc::clone(&self.shared),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

impl<S, P> fmt::Debug for AgentHandle<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("state", &self.loop_state())
            .finish_non_exhaustive()
    }
}

impl<S, P> AgentHandle<S, P> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Takes effect between ticks, never during an action.
    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// The running tick completes, then the loop fails the open goal and exits.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Queue a goal with the agent's configured initial budget. It replaces
    /// the running goal at the next tick.
    pub fn set_goal(&self, goal: GoalStructure<S, P>) -> Result<(), AgentError> {
        submit_goal(&self.id, &self.shared, &self.control, goal, self.initial_budget)
    }

    pub fn set_goal_with_budget(
        &self,
        goal: GoalStructure<S, P>,
        budget: f64,
    ) -> Result<(), AgentError> {
        submit_goal(&self.id, &self.shared, &self.control, goal, Some(budget))
    }

    /// Queue a message and wake the loop, resuming it if paused. Returns
    /// false when the agent is stopping and the message was dropped.
    pub fn send_message_to_this_agent(&self, message: Message) -> bool {
        deliver_local(&self.control, &self.mailbox, message)
    }

    pub fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    pub fn loop_state(&self) -> LoopState {
        self.shared.ledger().state
    }

    pub fn has_exited(&self) -> bool {
        self.shared.ledger().exited
    }

    /// Block until the most recently submitted goal concluded and return
    /// the final report of the tree. Returns `None` if no goal was ever
    /// submitted, or if the loop exited before the goal could run.
    pub fn wait_until_the_goal_is_concluded(&self) -> Option<GoalReport> {
        let ledger = self.shared.ledger();
        let target = ledger.submitted;
        let ledger = self
            .shared
            .changed
            .wait_while(ledger, |ledger| ledger.concluded < target && !ledger.exited)
            .unwrap_or_else(PoisonError::into_inner);
        conclusion(&ledger, target)
    }

    /// Like [`Self::wait_until_the_goal_is_concluded`], giving up after
    /// `timeout`.
    pub fn wait_until_the_goal_is_concluded_timeout(
        &self,
        timeout: Duration,
    ) -> Option<GoalReport> {
        let ledger = self.shared.ledger();
        let target = ledger.submitted;
        let (ledger, _) = self
            .shared
            .changed
            .wait_timeout_while(ledger, timeout, |ledger| {
                ledger.concluded < target && !ledger.exited
            })
            .unwrap_or_else(PoisonError::into_inner);
        conclusion(&ledger, target)
    }

    /// Block until the loop reaches `state` or `timeout` elapsed.
    pub fn wait_for_state(&self, state: LoopState, timeout: Duration) -> bool {
        let ledger = self.shared.ledger();
        let (ledger, _) = self
            .shared
            .changed
            .wait_timeout_while(ledger, timeout, |ledger| ledger.state != state)
            .unwrap_or_else(PoisonError::into_inner);
        ledger.state == state
    }
}

fn conclusion(ledger: &Ledger, target: u64) -> Option<GoalReport> {
    if target == 0 || ledger.concluded < target {
        return None;
    }
    ledger.last_report.clone()
}
