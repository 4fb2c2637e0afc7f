// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Biglist - persistent order-statistics trees for mailbox storage.
//!
//! Elements live in the leaves of a B-tree whose nodes sit in a
//! [`NodeStore`] under opaque [`Handle`]s. Every internal entry caches its
//! subtree's element count and first key, so rank lookup, range extraction
//! and splicing all touch O(log n) nodes.
//!
//! # Quick Start
//!
//! ```
//! use biglist::mail::Access;
//! use biglist::mail::Body;
//! use biglist::mail::Incoming;
//! use biglist::mail::Mailbox;
//! use biglist::mail::Message;
//! use biglist::mail::NeverYield;
//! use biglist::mail::Principal;
//! use biglist::store::MemStore;
//! use biglist::MailboxConfig;
//! use biglist::Node;
//!
//! let owner = Principal(1);
//! let access = Access::new(owner);
//! let mut mailbox: Mailbox<MemStore<Node<Message>>, MemStore<Body>> =
//!     Mailbox::new(owner, MailboxConfig::default(), MemStore::new(), MemStore::new());
//!
//! let batch = (0..100).map(|i| Incoming::new(i).with_body(["hello"])).collect();
//! mailbox.receive_batch(&access, batch, &mut NeverYield).unwrap();
//!
//! mailbox.rm_message_seq(&access, &"10-19".parse().unwrap(), &mut NeverYield).unwrap();
//! assert_eq!(mailbox.len(), 90);
//! mailbox.undo_rmm(&access).unwrap();
//! assert_eq!(mailbox.message(10).unwrap().number, 10);
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod handle;
pub mod mail;
pub mod node;
pub mod reaper;
pub mod repair;
pub mod seq;
pub mod store;
pub mod tree;

pub use config::MailboxConfig;
pub use config::TreeConfig;
pub use cursor::Cursor;
pub use error::Error;
pub use error::Result;
pub use handle::Handle;
pub use node::Child;
pub use node::Element;
pub use node::Node;
pub use node::Tree;
pub use reaper::ReapProgress;
pub use reaper::Reaper;
pub use repair::RepairReport;
pub use seq::MessageSeq;
pub use store::FileStore;
pub use store::MemStore;
pub use store::NodeStore;
pub use tree::BigList;
pub use tree::Inconsistency;
