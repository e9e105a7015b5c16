//! Inter-agent messaging: messages, per-agent mailboxes and the router that
//! delivers between registered agents.
//!
//! Everything here is shared across agent threads and guarded by mutexes.

pub mod mailbox;
pub mod message;
pub mod messenger;
pub mod router;

pub use mailbox::Mailbox;
pub use message::{AckKind, Acknowledgement, CastKind, Message};
pub use messenger::Messenger;
pub use router::Router;
