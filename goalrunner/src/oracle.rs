//! Verdicts produced by test goals and the collector that records them.
//!
//! The scheduler only forwards verdicts; counting and trace bookkeeping are
//! the collector's job.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Undecided,
}

/// A timestamped pass/fail/undecided judgment about a solved goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub verdict: Verdict,
    pub label: String,
    pub info: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl VerdictEvent {
    pub fn new(verdict: Verdict, label: impl Into<String>, info: Option<String>) -> Self {
        Self {
            verdict,
            label: label.into(),
            info,
            timestamp: Utc::now(),
        }
    }

    pub fn pass(label: impl Into<String>) -> Self {
        Self::new(Verdict::Pass, label, None)
    }

    pub fn fail(label: impl Into<String>, info: impl Into<String>) -> Self {
        Self::new(Verdict::Fail, label, Some(info.into()))
    }

    pub fn undecided(label: impl Into<String>) -> Self {
        Self::new(Verdict::Undecided, label, None)
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn is_fail(&self) -> bool {
        self.verdict == Verdict::Fail
    }
}

/// Sink for verdicts, keyed by the id of the agent that produced them.
///
/// Shared between agents running on different threads.
pub trait DataCollector: Send + Sync {
    fn register_verdict(&self, agent_id: &str, verdict: VerdictEvent);
}

/// Verdicts recorded for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventTrace {
    pub events: Vec<VerdictEvent>,
    pub passes: u32,
    pub fails: u32,
    pub undecided: u32,
    pub last_fail: Option<VerdictEvent>,
}

impl EventTrace {
    fn record(&mut self, verdict: VerdictEvent) {
        match verdict.verdict {
            Verdict::Pass => self.passes += 1,
            Verdict::Fail => {
                self.fails += 1;
                self.last_fail = Some(verdict.clone());
            }
            Verdict::Undecided => self.undecided += 1,
        }
        self.events.push(verdict);
    }
}

/// Thread-safe in-memory collector.
#[derive(Debug, Default)]
pub struct InMemoryCollector {
    traces: Mutex<BTreeMap<String, EventTrace>>,
}

impl InMemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self, agent_id: &str) -> Option<EventTrace> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn total_passes(&self) -> u32 {
        self.sum(|trace| trace.passes)
    }

    pub fn total_fails(&self) -> u32 {
        self.sum(|trace| trace.fails)
    }

    fn sum(&self, field: impl Fn(&EventTrace) -> u32) -> u32 {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(field)
            .sum()
    }
}

impl DataCollector for InMemoryCollector {
    fn register_verdict(&self, agent_id: &str, verdict: VerdictEvent) {
        debug!(
            agent = agent_id,
            verdict = ?verdict.verdict,
            label = %verdict.label,
            "verdict registered"
        );
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(agent_id.to_string())
            .or_default()
            .record(verdict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_counts_per_agent() {
        let collector = InMemoryCollector::new();
        collector.register_verdict("a", VerdictEvent::pass("x == 1"));
        collector.register_verdict("a", VerdictEvent::fail("y == 2", "y was 3"));
        collector.register_verdict("b", VerdictEvent::undecided("z"));

        let trace = collector.trace("a").expect("trace a");
        assert_eq!((trace.passes, trace.fails, trace.undecided), (1, 1, 0));
        assert_eq!(trace.events.len(), 2);
        assert_eq!(
            trace.last_fail.and_then(|v| v.info),
            Some("y was 3".to_string())
        );
        assert_eq!(collector.total_passes(), 1);
        assert_eq!(collector.total_fails(), 1);
        assert_eq!(collector.agent_ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(collector.trace("c").is_none());
    }
}
