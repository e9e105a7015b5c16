//! Per-agent queue of undelivered messages.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::comms::message::Message;

/// Thread-safe FIFO of incoming messages with predicate-based lookup.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, message: Message) {
        self.queue().push_back(message);
    }

    /// Oldest message matching `predicate`, left in place.
    pub fn find(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
        self.queue().iter().find(|message| predicate(message)).cloned()
    }

    pub fn has(&self, predicate: impl Fn(&Message) -> bool) -> bool {
        self.queue().iter().any(|message| predicate(message))
    }

    /// Remove and return the oldest message matching `predicate`.
    pub fn retrieve(&self, predicate: impl Fn(&Message) -> bool) -> Option<Message> {
        let mut queue = self.queue();
        let position = queue.iter().position(|message| predicate(message))?;
        queue.remove(position)
    }

    /// Remove every queued message, oldest first.
    pub fn drain(&self) -> Vec<Message> {
        self.queue().drain(..).collect()
    }

    pub fn size(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_takes_oldest_match_and_keeps_the_rest() {
        let mailbox = Mailbox::new();
        mailbox.put(Message::single("a", "me", "ping"));
        mailbox.put(Message::single("b", "me", "pong"));
        mailbox.put(Message::single("c", "me", "ping"));

        assert!(mailbox.has(|m| m.name() == "pong"));
        assert_eq!(
            mailbox.find(|m| m.name() == "ping").map(|m| m.source().to_string()),
            Some("a".to_string())
        );
        assert_eq!(mailbox.size(), 3);

        let taken = mailbox.retrieve(|m| m.name() == "ping").expect("ping");
        assert_eq!(taken.source(), "a");
        assert_eq!(mailbox.size(), 2);
        assert!(mailbox.retrieve(|m| m.name() == "missing").is_none());

        let rest: Vec<String> = mailbox
            .drain()
            .iter()
            .map(|m| m.source().to_string())
            .collect();
        assert_eq!(rest, vec!["b", "c"]);
        assert!(mailbox.is_empty());
    }
}
