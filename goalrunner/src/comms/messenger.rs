//! Per-agent messaging facade, typically stored in the agent state so that
//! actions can read and send messages.

use std::sync::Arc;

use serde_json::Value;

use crate::comms::mailbox::Mailbox;
use crate::comms::message::{Acknowledgement, CastKind, Message};
use crate::comms::router::Router;

#[derive(Debug, Clone)]
pub struct Messenger {
    agent_id: String,
    mailbox: Arc<Mailbox>,
    router: Arc<Router>,
}

impl Messenger {
    pub fn new(agent_id: impl Into<String>, mailbox: Arc<Mailbox>, router: Arc<Router>) -> Self {
        Self {
            agent_id: agent_id.into(),
            mailbox,
            router,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Send with this agent as the source.
    pub fn send(
        &self,
        cast: CastKind,
        target: impl Into<String>,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Acknowledgement {
        self.router
            .send(Message::new(self.agent_id.clone(), cast, target, name).with_args(args))
    }

    /// Send a prepared message; its source is overwritten with this agent.
    pub fn send_message(&self, message: Message) -> Acknowledgement {
        self.router.send(message.from_source(&self.agent_id))
    }

    pub fn find(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
        self.mailbox.find(predicate)
    }

    pub fn has(&self, predicate: impl Fn(&Message) -> bool) -> bool {
        self.mailbox.has(predicate)
    }

    pub fn retrieve(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
        self.mailbox.retrieve(predicate)
    }

    pub fn size(&self) -> usize {
        self.mailbox.size()
    }

    pub fn is_empty(&self) -> bool {
        self.mailbox.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messenger_fills_in_source_and_reads_own_mailbox() {
        let router = Arc::new(Router::new());
        let inbox_a = Arc::new(Mailbox::new());
        let inbox_b = Arc::new(Mailbox::new());
        router.register("a", None, Arc::clone(&inbox_a));
        router.register("b", Some("medic".to_string()), Arc::clone(&inbox_b));
        let a = Messenger::new("a", inbox_a, Arc::clone(&router));
        let b = Messenger::new("b", inbox_b, router);

        assert!(
            a.send(CastKind::Role, "medic", "heal", vec![Value::from(5)])
                .is_success()
        );
        assert!(
            a.send_message(Message::single("spoofed", "b", "bye"))
                .is_success()
        );
        assert_eq!(b.size(), 2);
        let heal = b.retrieve(|m| m.name() == "heal").expect("heal");
        assert_eq!(heal.source(), "a");
        assert_eq!(heal.args(), [Value::from(5)]);
        assert_eq!(
            b.find(|m| m.name() == "bye").map(|m| m.source().to_string()),
            Some("a".to_string())
        );
        assert!(a.is_empty());
    }
}
