// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Mailboxes built on the node list.
//!
//! A [`Mailbox`] owns one message tree. Messages are ordered by arrival and
//! addressed by rank; numbers are assigned on arrival and only change when
//! the mailbox is renumbered. Long operations take a [`Yielder`] and
//! suspend between quanta.

mod access;
mod mailbox;
mod message;
mod recovery;
mod remove;
mod renumber;
mod yielding;

pub use access::Access;
pub use access::Consent;
pub use access::Principal;
pub use access::REQUIRED_CONFIRMATIONS;
pub use mailbox::Mailbox;
pub use mailbox::MailboxState;
pub use mailbox::Piece;
pub use mailbox::ReceiveReport;
pub use message::Body;
pub use message::Incoming;
pub use message::Message;
pub use message::MessageKey;
pub use recovery::RestoreReport;
pub use remove::RemoveReport;
pub use renumber::RenumberReport;
pub use yielding::Budget;
pub use yielding::NeverYield;
pub use yielding::Yielder;
