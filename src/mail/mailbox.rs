// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! The mailbox: the entity that owns a message tree.
//!
//! A mailbox keeps the authoritative tree handle for its messages, the
//! staging area of removed-but-not-expunged ranges, the kept-message marks,
//! and the teardown queue for expunged messages. Every batch operation
//! writes its progress back here before it yields, so whatever runs during
//! the yield sees a consistent mailbox.

use std::ops::Range;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::config::MailboxConfig;
use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::mail::Access;
use crate::mail::Body;
use crate::mail::Incoming;
use crate::mail::Message;
use crate::mail::MessageKey;
use crate::mail::NeverYield;
use crate::mail::Principal;
use crate::mail::Yielder;
use crate::node::Node;
use crate::node::Tree;
use crate::reaper::Reaper;
use crate::seq::MessageSeq;
use crate::store::NodeStore;
use crate::tree::BigList;
use crate::tree::Inconsistency;

/// A removed range waiting for undo or expunge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    /// Rank the range followed when it was removed.
    pub after: u64,
    pub subtree: Tree<MessageKey>,
    /// Kept marks the range carried, in the ranks it had when removed.
    pub kept: MessageSeq,
    /// Highest message number in the range.
    pub last_number: u64,
}

impl Piece {
    /// The ranks this piece occupied when it was removed.
    pub fn span(&self) -> MessageSeq {
        return MessageSeq::from_range(self.after + 1, self.after + 1 + self.subtree.count);
    }
}

/// Everything a mailbox needs to be reopened over the same stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MailboxState {
    pub owner: Principal,
    #[serde(default)]
    pub config: MailboxConfig,
    pub messages: Tree<MessageKey>,
    #[serde(default)]
    pub messages_going: Vec<Piece>,
    #[serde(default)]
    pub messages_kept: MessageSeq,
    #[serde(default)]
    pub reaper: Reaper,
}

/// Outcome of [`Mailbox::receive_batch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveReport {
    pub received: u64,
    pub first_number: Option<u64>,
    pub last_number: Option<u64>,
}

/// A mail recipient's message store.
#[derive(Debug)]
pub struct Mailbox<S, B> {
    pub(crate) owner: Principal,
    pub(crate) config: MailboxConfig,
    pub(crate) list: BigList<Message, S>,
    pub(crate) bodies: B,
    pub(crate) messages: Tree<MessageKey>,
    pub(crate) messages_going: Vec<Piece>,
    pub(crate) messages_kept: MessageSeq,
    pub(crate) reaper: Reaper,
}

impl<S, B> Mailbox<S, B>
where
    S: NodeStore<Node<Message>>,
    B: NodeStore<Body>,
{
    /// An empty mailbox over fresh stores.
    pub fn new(owner: Principal, config: MailboxConfig, store: S, bodies: B) -> Mailbox<S, B> {
        let list = BigList::new(store, config.tree.clone());
        return Mailbox {
            owner,
            config,
            list,
            bodies,
            messages: Tree::empty(),
            messages_going: Vec::new(),
            messages_kept: MessageSeq::new(),
            reaper: Reaper::new(),
        };
    }

    /// Reopen a mailbox from saved state and the stores it was saved with.
    pub fn from_state(state: MailboxState, store: S, bodies: B) -> Mailbox<S, B> {
        let list = BigList::new(store, state.config.tree.clone());
        return Mailbox {
            owner: state.owner,
            config: state.config,
            list,
            bodies,
            messages: state.messages,
            messages_going: state.messages_going,
            messages_kept: state.messages_kept,
            reaper: state.reaper,
        };
    }

    /// Snapshot of everything but the stores.
    pub fn state(&self) -> MailboxState {
        return MailboxState {
            owner: self.owner,
            config: self.config.clone(),
            messages: self.messages.clone(),
            messages_going: self.messages_going.clone(),
            messages_kept: self.messages_kept.clone(),
            reaper: self.reaper.clone(),
        };
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn owner(&self) -> Principal {
        return self.owner;
    }

    pub fn config(&self) -> &MailboxConfig {
        return &self.config;
    }

    /// The authoritative tree handle.
    pub fn tree(&self) -> &Tree<MessageKey> {
        return &self.messages;
    }

    pub fn list(&self) -> &BigList<Message, S> {
        return &self.list;
    }

    /// Raw access to the node store, for operator tooling.
    pub fn list_mut(&mut self) -> &mut BigList<Message, S> {
        return &mut self.list;
    }

    pub fn bodies(&self) -> &B {
        return &self.bodies;
    }

    pub fn bodies_mut(&mut self) -> &mut B {
        return &mut self.bodies;
    }

    /// Ranges removed and awaiting undo or expunge, oldest first.
    pub fn staged(&self) -> &[Piece] {
        return &self.messages_going;
    }

    /// Number of messages awaiting undo or expunge.
    pub fn staged_count(&self) -> u64 {
        return self.messages_going.iter().map(|piece| piece.subtree.count).sum();
    }

    pub fn reaper(&self) -> &Reaper {
        return &self.reaper;
    }

    pub fn messages_kept(&self) -> &MessageSeq {
        return &self.messages_kept;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn len(&self) -> u64 {
        return self.messages.count;
    }

    pub fn is_empty(&self) -> bool {
        return self.messages.count == 0;
    }

    /// The message at 1-based `rank`.
    pub fn message(&self, rank: u64) -> Result<Message> {
        return self.list.find_nth(&self.messages, rank);
    }

    /// Messages at ranks `lo..=hi`.
    pub fn messages(&self, lo: u64, hi: u64) -> Result<Vec<Message>> {
        return self.list.slice(&self.messages, lo, hi);
    }

    /// Body of the message at `rank`, if it has one.
    pub fn body(&self, rank: u64) -> Result<Option<Body>> {
        let message = self.message(rank)?;
        return message.body.map(|handle| self.bodies.read(handle)).transpose();
    }

    /// Rank of the message numbered `number`, if present.
    pub fn rank_of_number(&self, number: u64) -> Result<Option<u64>> {
        let key = MessageKey {
            number,
            timestamp: i64::MIN,
        };
        let below = self.list.find_ord(&self.messages, &key, |a, b| a.number < b.number)?;
        if below == self.messages.count {
            return Ok(None);
        }
        let candidate = self.list.find_nth(&self.messages, below + 1)?;
        return Ok((candidate.number == number).then_some(below + 1));
    }

    /// Rank of the first message that arrived at or after `timestamp`, or
    /// `len() + 1` if none did.
    ///
    /// Timestamps are whatever the caller supplied on receipt, and a restored
    /// mailbox keeps its source's scan order. The answer is only meaningful
    /// when timestamps do not decrease with rank; otherwise it is unspecified.
    pub fn rank_since(&self, timestamp: i64) -> Result<u64> {
        let key = MessageKey {
            number: 0,
            timestamp,
        };
        let below = self.list.find_ord(&self.messages, &key, |a, b| a.timestamp < b.timestamp)?;
        return Ok(below + 1);
    }

    /// Check the message tree's invariants without changing anything.
    pub fn verify(&self) -> Result<Vec<Inconsistency>> {
        return self.list.verify(&self.messages);
    }

    // ========================================================================
    // Kept marks
    // ========================================================================

    /// Mark messages as kept.
    pub fn keep(&mut self, access: &Access, seq: &MessageSeq) -> Result<()> {
        access.check(self.owner)?;
        self.check_seq(seq)?;
        self.messages_kept = self.messages_kept.union(seq);
        return Ok(());
    }

    /// Clear kept marks.
    pub fn unkeep(&mut self, access: &Access, seq: &MessageSeq) -> Result<()> {
        access.check(self.owner)?;
        self.messages_kept = self.messages_kept.difference(seq);
        return Ok(());
    }

    pub(crate) fn check_seq(&self, seq: &MessageSeq) -> Result<()> {
        if let Some(last) = seq.last() {
            if last > self.messages.count {
                return Err(Error::OutOfRange {
                    rank: last,
                    len: self.messages.count,
                });
            }
        }
        return Ok(());
    }

    // ========================================================================
    // Receiving
    // ========================================================================

    /// The number the next message should get: one past the highest number
    /// in the mailbox, counting ranges staged for removal.
    pub(crate) fn next_number(&self) -> Result<u64> {
        let last_live = match self.messages.count {
            0 => 0,
            count => self.list.find_nth(&self.messages, count)?.number,
        };
        let last_staged = self.messages_going.iter().map(|piece| piece.last_number).max().unwrap_or(0);
        return Ok(last_live.max(last_staged) + 1);
    }

    fn release_bodies(&mut self, handles: &[Handle]) {
        for &handle in handles {
            if let Err(e) = self.bodies.free(handle) {
                warn!(%handle, error = %e, "could not release body");
            }
        }
    }

    /// Append one chunk, all or nothing. Returns the numbers assigned.
    fn append_chunk(&mut self, chunk: Vec<Incoming>, floor: u64) -> Result<Range<u64>> {
        let start = self.next_number()?.max(floor);
        let mut allocated = Vec::new();
        let mut records = Vec::with_capacity(chunk.len());
        for (i, incoming) in chunk.into_iter().enumerate() {
            let body = match incoming.body {
                Some(lines) => match self.bodies.allocate(Body { lines }) {
                    Ok(handle) => {
                        allocated.push(handle);
                        Some(handle)
                    }
                    Err(e) => {
                        self.release_bodies(&allocated);
                        return Err(e);
                    }
                },
                None => None,
            };
            records.push(Message {
                number: start + i as u64,
                timestamp: incoming.timestamp,
                headers: incoming.headers,
                body,
            });
        }
        let end = start + records.len() as u64;
        match self.list.push_back(&self.messages, records) {
            Ok(tree) => self.messages = tree,
            Err(e) => {
                self.release_bodies(&allocated);
                return Err(e);
            }
        }
        return Ok(start..end);
    }

    /// Append many messages, yielding after every quantum.
    ///
    /// Numbers increase strictly across the whole batch, even if other
    /// operations run while it is suspended. On failure the error is a
    /// [`Error::Batch`] carrying how many messages were committed.
    pub fn receive_batch<Y>(
        &mut self,
        access: &Access,
        incoming: Vec<Incoming>,
        yielder: &mut Y,
    ) -> Result<ReceiveReport>
    where
        Y: Yielder<S, B>,
    {
        access.check(self.owner)?;
        let quantum = self.config.quantum.max(1) as usize;
        let mut report = ReceiveReport::default();
        let mut floor = 0;
        let mut pending = incoming.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk: Vec<Incoming> = pending.by_ref().take(quantum).collect();
            let added = chunk.len() as u64;
            let numbers = self
                .append_chunk(chunk, floor)
                .map_err(|e| e.in_batch(report.received))?;
            report.first_number.get_or_insert(numbers.start);
            report.last_number = Some(numbers.end - 1);
            report.received += added;
            floor = numbers.end;

            if pending.peek().is_some() {
                yielder
                    .yield_point(self)
                    .map_err(|e| e.in_batch(report.received))?;
            }
        }
        info!(
            owner = %self.owner,
            received = report.received,
            count = self.messages.count,
            "received messages"
        );
        return Ok(report);
    }

    /// Append a single message, returning its number.
    pub fn receive(&mut self, access: &Access, incoming: Incoming) -> Result<u64> {
        match self.receive_batch(access, vec![incoming], &mut NeverYield) {
            Ok(report) => return Ok(report.last_number.unwrap_or_default()),
            Err(Error::Batch { source, .. }) => return Err(*source),
            Err(e) => return Err(e),
        }
    }
}
