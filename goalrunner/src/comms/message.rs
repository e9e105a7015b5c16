//! Message values and delivery acknowledgements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a message is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastKind {
    /// To the agent whose id is the target.
    Single,
    /// To every agent with the target role, except the sender.
    Role,
    /// To every registered agent except the sender. The target is ignored.
    Broadcast,
}

/// An immutable message between agents.
///
/// Fields are fixed once the message is built. The timestamp is set when the
/// message is created and refreshed by the router at delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    source: String,
    cast: CastKind,
    target: String,
    name: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    priority: i32,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        source: impl Into<String>,
        cast: CastKind,
        target: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            cast,
            target: target.into(),
            name: name.into(),
            args: Vec::new(),
            priority: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn single(
        source: impl Into<String>,
        target: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(source, CastKind::Single, target, name)
    }

    pub fn role(
        source: impl Into<String>,
        role: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(source, CastKind::Role, role, name)
    }

    pub fn broadcast(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(source, CastKind::Broadcast, "", name)
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn cast(&self) -> CastKind {
        self.cast
    }

    /// Receiver id or role. Empty for broadcasts.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Higher means more urgent. Informational only.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Sent on behalf of `source`, whatever the builder said.
    pub(crate) fn from_source(mut self, source: &str) -> Self {
        source.clone_into(&mut self.source);
        self
    }

    pub(crate) fn stamped(mut self) -> Self {
        self.timestamp = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckKind {
    Success,
    Rejected,
}

/// Result of a send. Routing problems are reported here, never as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub kind: AckKind,
    pub info: Option<String>,
}

impl Acknowledgement {
    pub fn success() -> Self {
        Self {
            kind: AckKind::Success,
            info: None,
        }
    }

    pub fn rejected(info: impl Into<String>) -> Self {
        Self {
            kind: AckKind::Rejected,
            info: Some(info.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == AckKind::Success
    }

    pub fn is_rejected(&self) -> bool {
        self.kind == AckKind::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_addressing_fields() {
        let msg = Message::role("scout", "medic", "heal")
            .with_arg("north")
            .with_arg(3)
            .with_priority(2);
        assert_eq!(msg.cast(), CastKind::Role);
        assert_eq!(msg.target(), "medic");
        assert_eq!(msg.args(), [Value::from("north"), Value::from(3)]);
        assert_eq!(msg.priority(), 2);

        let all = Message::broadcast("scout", "ping");
        assert_eq!(all.cast(), CastKind::Broadcast);
        assert!(all.target().is_empty());
    }

    #[test]
    fn message_serializes_to_json() {
        let msg = Message::single("a", "b", "hello").with_arg(true);
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["cast"], "single");
        assert_eq!(json["args"][0], true);
        let back: Message = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, msg);
    }

    #[test]
    fn restamping_keeps_content_and_moves_time_forward() {
        let msg = Message::single("a", "b", "hello").with_arg(1);
        let sent = msg.clone().from_source("c").stamped();
        assert_eq!(sent.source(), "c");
        assert_eq!(sent.name(), msg.name());
        assert_eq!(sent.args(), msg.args());
        assert!(sent.timestamp() >= msg.timestamp());
    }
}
