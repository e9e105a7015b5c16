//! Directory of registered agents and message delivery between them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::autonomous::Control;
use crate::comms::mailbox::Mailbox;
use crate::comms::message::{Acknowledgement, CastKind, Message};

/// Where messages for one registered agent go.
#[derive(Clone)]
pub(crate) struct Endpoint {
    role: Option<String>,
    mailbox: Arc<Mailbox>,
    control: Option<Arc<Control>>,
}

impl Endpoint {
    /// Queue the message and wake the owning agent. A stopping agent drops it.
    fn deliver(&self, message: Message) {
        match &self.control {
            Some(control) => {
                if control.is_stopping() {
                    debug!(name = message.name(), "message dropped: agent is stopping");
                    return;
                }
                self.mailbox.put(message);
                control.notify_message();
            }
            None => self.mailbox.put(message),
        }
    }
}

/// Keeps an agent registered for as long as it is alive.
pub(crate) struct Registration {
    router: Arc<Router>,
    id: String,
    mailbox: Arc<Mailbox>,
}

impl Registration {
    pub(crate) fn new(
        router: Arc<Router>,
        id: &str,
        role: Option<&str>,
        mailbox: &Arc<Mailbox>,
        control: &Arc<Control>,
    ) -> Self {
        router.register_endpoint(
            id.to_string(),
            Endpoint {
                role: role.map(str::to_string),
                mailbox: Arc::clone(mailbox),
                control: Some(Arc::clone(control)),
            },
        );
        Self {
            router,
            id: id.to_string(),
            mailbox: Arc::clone(mailbox),
        }
    }

    pub(crate) fn router(&self) -> &Arc<Router> {
        &self.router
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.router.deregister_mailbox(&self.id, &self.mailbox);
    }
}

#[derive(Default)]
struct Directory {
    by_id: BTreeMap<String, Endpoint>,
    by_role: BTreeMap<String, BTreeSet<String>>,
}

/// Shared directory resolving single, role and broadcast casts.
///
/// Delivery happens while the directory lock is held, so messages from one
/// sender reach each mailbox in send order.
#[derive(Default)]
pub struct Router {
    directory: Mutex<Directory>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("agents", &self.registered_ids())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a passive mailbox, e.g. an observer that is not an agent loop.
    /// Re-registering an id replaces the previous entry.
    pub fn register(&self, id: impl Into<String>, role: Option<String>, mailbox: Arc<Mailbox>) {
        self.register_endpoint(
            id.into(),
            Endpoint {
                role,
                mailbox,
                control: None,
            },
        );
    }

    fn register_endpoint(&self, id: String, endpoint: Endpoint) {
        let mut directory = self.directory();
        remove_entry(&mut directory, &id);
        if let Some(role) = &endpoint.role {
            directory
                .by_role
                .entry(role.clone())
                .or_default()
                .insert(id.clone());
        }
        debug!(agent = %id, role = ?endpoint.role, "agent registered");
        directory.by_id.insert(id, endpoint);
    }

    /// Returns false if `id` was not registered.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = remove_entry(&mut self.directory(), id);
        if removed {
            debug!(agent = id, "agent deregistered");
        }
        removed
    }

    /// Deregister `id` only while it is still bound to `mailbox`, so a
    /// newer registration under the same id survives.
    fn deregister_mailbox(&self, id: &str, mailbox: &Arc<Mailbox>) -> bool {
        let mut directory = self.directory();
        let bound = directory
            .by_id
            .get(id)
            .is_some_and(|endpoint| Arc::ptr_eq(&endpoint.mailbox, mailbox));
        let removed = bound && remove_entry(&mut directory, id);
        if removed {
            debug!(agent = id, "agent deregistered");
        }
        removed
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.directory().by_id.contains_key(id)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.directory().by_id.keys().cloned().collect()
    }

    /// Ids registered under `role`, in lexicographic order.
    pub fn agents_with_role(&self, role: &str) -> Vec<String> {
        self.directory()
            .by_role
            .get(role)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver `message`.
    ///
    /// Rejected when the sender is not registered, or when a single cast names
    /// an unregistered target. Role and broadcast casts never reach the sender
    /// and succeed even without recipients.
    pub fn send(&self, message: Message) -> Acknowledgement {
        let directory = self.directory();
        if !directory.by_id.contains_key(message.source()) {
            warn!(
                source = message.source(),
                name = message.name(),
                "message rejected: sender is not registered"
            );
            return Acknowledgement::rejected("sender is not registered");
        }
        let message = message.stamped();
        match message.cast() {
            CastKind::Single => {
                let Some(receiver) = directory.by_id.get(message.target()) else {
                    warn!(
                        source = message.source(),
                        target = message.target(),
                        name = message.name(),
                        "message rejected: receiver is not registered"
                    );
                    return Acknowledgement::rejected("receiver is not registered");
                };
                receiver.deliver(message);
            }
            CastKind::Role => {
                let receivers = directory
                    .by_role
                    .get(message.target())
                    .into_iter()
                    .flatten()
                    .filter(|id| id.as_str() != message.source())
                    .filter_map(|id| directory.by_id.get(id));
                for receiver in receivers {
                    receiver.deliver(message.clone());
                }
            }
            CastKind::Broadcast => {
                let receivers = directory
                    .by_id
                    .iter()
                    .filter(|(id, _)| id.as_str() != message.source())
                    .map(|(_, endpoint)| endpoint);
                for receiver in receivers {
                    receiver.deliver(message.clone());
                }
            }
        }
        Acknowledgement::success()
    }
}

fn remove_entry(directory: &mut Directory, id: &str) -> bool {
    let Some(endpoint) = directory.by_id.remove(id) else {
        return false;
    };
    if let Some(role) = endpoint.role {
        if let Some(ids) = directory.by_role.get_mut(&role) {
            ids.remove(id);
            if ids.is_empty() {
                directory.by_role.remove(&role);
            }
        }
    }
    true
}
