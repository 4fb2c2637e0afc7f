// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Operator recovery: structural repair and restore-from-scratch.
//!
//! Both are irreversible and refuse to run without
//! [`REQUIRED_CONFIRMATIONS`] confirmations on the [`Consent`].

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::Result;
use crate::handle::Handle;
use crate::mail::Access;
use crate::mail::Body;
use crate::mail::Consent;
use crate::mail::Incoming;
use crate::mail::Mailbox;
use crate::mail::Message;
use crate::mail::NeverYield;
use crate::mail::REQUIRED_CONFIRMATIONS;
use crate::node::Node;
use crate::repair::RepairReport;
use crate::seq::MessageSeq;
use crate::store::NodeStore;

/// Outcome of [`Mailbox::restore_from`].
///
/// Every message found is either `recovered` with its own body (or with
/// none, if it never had one) or given the placeholder body, so
/// `recovered + sentinel_bodies == messages_scanned`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub nodes_scanned: u64,
    pub leaves_scanned: u64,
    pub messages_scanned: u64,
    pub recovered: u64,
    /// Messages whose body could not be read and got the placeholder.
    pub sentinel_bodies: u64,
    /// Slots in the source store that could not be decoded.
    pub unreadable_nodes: u64,
}

impl<S, B> Mailbox<S, B>
where
    S: NodeStore<Node<Message>>,
    B: NodeStore<Body>,
{
    /// Repair the message tree.
    ///
    /// Staged and reaping subtrees are protected: their nodes are neither
    /// claimed by the message tree nor treated as orphans. Kept marks past
    /// the repaired length are dropped.
    pub fn repair(&mut self, access: &Access, consent: Consent) -> Result<RepairReport> {
        access.check(self.owner)?;
        consent.require(REQUIRED_CONFIRMATIONS)?;

        let mut protected: Vec<Handle> = self
            .messages_going
            .iter()
            .filter_map(|piece| piece.subtree.root)
            .collect();
        protected.extend_from_slice(self.reaper.pending());

        let (messages, report) = self.list.repair(&self.messages, &protected)?;
        self.messages = messages;
        self.messages_kept = self
            .messages_kept
            .intersection(&MessageSeq::from_range(1, self.messages.count + 1));
        info!(owner = %self.owner, count = self.messages.count, clean = report.is_clean(), "mailbox repaired");
        return Ok(report);
    }

    /// Rebuild this mailbox's contents from whatever messages can be found
    /// in `source`'s node store.
    ///
    /// Every leaf slot is scanned in handle order, ignoring the source's
    /// tree structure entirely. Each message found is received here with a
    /// fresh number, so order and deletion status are not preserved. A
    /// message whose body cannot be read gets `lost_body` instead. The
    /// source is only read.
    pub fn restore_from<S2, B2>(
        &mut self,
        access: &Access,
        consent: Consent,
        source: &Mailbox<S2, B2>,
        lost_body: &[String],
    ) -> Result<RestoreReport>
    where
        S2: NodeStore<Node<Message>>,
        B2: NodeStore<Body>,
    {
        access.check(self.owner)?;
        consent.require(REQUIRED_CONFIRMATIONS)?;

        let mut report = RestoreReport::default();
        let quantum = self.config.quantum.max(1) as usize;
        let mut pending = Vec::with_capacity(quantum);
        let mut committed = 0;
        for handle in source.list.store().handles()? {
            report.nodes_scanned += 1;
            let messages = match source.list.store().read(handle) {
                Ok(Node::Leaf(messages)) => messages,
                Ok(Node::Internal(_)) => continue,
                Err(e) => {
                    warn!(%handle, error = %e, "unreadable slot");
                    report.unreadable_nodes += 1;
                    continue;
                }
            };
            report.leaves_scanned += 1;
            for message in messages {
                report.messages_scanned += 1;
                let body = match message.body {
                    None => None,
                    Some(body) => match source.bodies.read(body) {
                        Ok(body) => Some(body.lines),
                        Err(e) => {
                            warn!(number = message.number, %body, error = %e, "body lost");
                            report.sentinel_bodies += 1;
                            Some(lost_body.to_vec())
                        }
                    },
                };
                pending.push(Incoming {
                    timestamp: message.timestamp,
                    headers: message.headers,
                    body,
                });
                if pending.len() >= quantum {
                    committed += self.restore_chunk(access, std::mem::take(&mut pending), committed)?;
                }
            }
        }
        if !pending.is_empty() {
            self.restore_chunk(access, pending, committed)?;
        }
        report.recovered = report.messages_scanned - report.sentinel_bodies;
        info!(
            owner = %self.owner,
            scanned = report.messages_scanned,
            recovered = report.recovered,
            sentinels = report.sentinel_bodies,
            unreadable = report.unreadable_nodes,
            "restored mailbox"
        );
        return Ok(report);
    }

    fn restore_chunk(&mut self, access: &Access, chunk: Vec<Incoming>, committed: u64) -> Result<u64> {
        let report = self.receive_batch(access, chunk, &mut NeverYield).map_err(|e| {
            let done = e.processed().unwrap_or(0);
            return e.in_batch(committed + done);
        })?;
        return Ok(report.received);
    }
}
