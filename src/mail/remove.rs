// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Removal, undo, and expunge.
//!
//! Removing ranges detaches them into the staging area without freeing
//! anything. Undo splices the staged pieces back in reverse order; expunge
//! hands them to the mailbox's reaper, which frees nodes and bodies a
//! budget at a time.
//!
//! Kept marks follow the messages: removing a range closes its marks out
//! of the mask and saves them on the piece, and undo reopens the gap and
//! restores them. A staged message is never kept.

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::mail::Access;
use crate::mail::Body;
use crate::mail::Budget;
use crate::mail::Mailbox;
use crate::mail::Message;
use crate::mail::Piece;
use crate::mail::Yielder;
use crate::node::Node;
use crate::reaper::ReapProgress;
use crate::seq::MessageSeq;
use crate::store::NodeStore;

/// Outcome of [`Mailbox::rm_message_seq`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub removed: u64,
    /// Number of the first message removed.
    pub first_number: Option<u64>,
    /// Number of the last message removed.
    pub last_number: Option<u64>,
}

impl<S, B> Mailbox<S, B>
where
    S: NodeStore<Node<Message>>,
    B: NodeStore<Body>,
{
    /// Remove the messages at the ranks in `seq`, staging them for undo.
    ///
    /// Ranges are taken in ascending order, each detached whole. Between
    /// ranges the operation may yield. Messages received meanwhile are fine;
    /// if the staging area changed or messages disappeared it stops with
    /// [`Error::Aborted`], leaving the ranges already removed staged.
    pub fn rm_message_seq<Y>(
        &mut self,
        access: &Access,
        seq: &MessageSeq,
        yielder: &mut Y,
    ) -> Result<RemoveReport>
    where
        Y: Yielder<S, B>,
    {
        access.check(self.owner)?;
        self.check_seq(seq)?;

        let mut budget = Budget::new(self.config.quantum);
        let mut report = RemoveReport::default();
        let ranges = seq.ranges();
        for (i, range) in ranges.iter().enumerate() {
            let lo = range.start - report.removed;
            let hi = range.end - 1 - report.removed;
            let last_number = self
                .list
                .find_nth(&self.messages, hi)
                .map_err(|e| e.in_batch(report.removed))?
                .number;
            let (remaining, detached) = self
                .list
                .extract_range(&self.messages, lo, hi)
                .map_err(|e| e.in_batch(report.removed))?;
            let first_number = detached.first.map(|key| key.number);
            self.messages = remaining;

            let span = MessageSeq::from_range(lo, hi + 1);
            let kept = self.messages_kept.intersection(&span);
            self.messages_kept = self.messages_kept.remove_and_close(&span);
            self.messages_going.push(Piece {
                after: lo - 1,
                subtree: detached,
                kept,
                last_number,
            });
            report.removed += hi - lo + 1;
            report.first_number = report.first_number.or(first_number);
            report.last_number = Some(last_number);

            if i + 1 < ranges.len() && budget.spend(hi - lo + 1) {
                let staged = self.messages_going.len();
                let newest = self.messages_going.last().map(|piece| piece.subtree.root);
                let count = self.messages.count;
                yielder
                    .yield_point(self)
                    .map_err(|e| e.in_batch(report.removed))?;
                // Arrivals append past every remaining range; anything that
                // shrinks the mailbox or touches the staging area shifts ranks.
                let shifted = self.messages_going.len() != staged
                    || self.messages_going.last().map(|piece| piece.subtree.root) != newest
                    || self.messages.count < count;
                if shifted {
                    warn!(removed = report.removed, "mailbox changed while removing");
                    return Err(Error::Aborted {
                        processed: report.removed,
                        reason: "mailbox changed during removal",
                    });
                }
            }
        }
        info!(
            owner = %self.owner,
            removed = report.removed,
            staged = self.messages_going.len(),
            "removed messages"
        );
        return Ok(report);
    }

    /// Put every staged range back where it came from. Returns the number of
    /// messages restored.
    pub fn undo_rmm(&mut self, access: &Access) -> Result<u64> {
        access.check(self.owner)?;
        let mut restored = 0;
        while let Some(piece) = self.messages_going.pop() {
            let span = piece.span();
            match self.list.insert_after(&self.messages, piece.subtree.clone(), piece.after) {
                Ok(tree) => self.messages = tree,
                Err(e) => {
                    self.messages_going.push(piece);
                    return Err(e.in_batch(restored));
                }
            }
            self.messages_kept = self.messages_kept.open_and_insert(&span).union(&piece.kept);
            restored += span.count();
        }
        info!(owner = %self.owner, restored, "undid removal");
        return Ok(restored);
    }

    /// Commit every staged removal. The pieces move to the reaper and are
    /// freed by [`Mailbox::reap`]; this returns at once with the number of
    /// messages expunged.
    pub fn expunge_rmm(&mut self, access: &Access) -> Result<u64> {
        access.check(self.owner)?;
        let mut expunged = 0;
        for piece in self.messages_going.drain(..) {
            expunged += piece.subtree.count;
            self.reaper.push(piece.subtree);
        }
        info!(owner = %self.owner, expunged, queued = self.reaper.pending().len(), "expunged");
        return Ok(expunged);
    }

    /// Free up to `budget` nodes of expunged messages, with their bodies.
    pub fn reap(&mut self, budget: u64) -> Result<ReapProgress> {
        let Mailbox {
            list,
            bodies,
            reaper,
            ..
        } = self;
        return reaper.step(list, budget, |message: Message| {
            let Some(body) = message.body else {
                return Ok(());
            };
            match bodies.free(body) {
                Ok(()) => return Ok(()),
                Err(Error::NotFound(_)) => {
                    warn!(number = message.number, %body, "message body already gone");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        });
    }

    /// Run the reaper until nothing is queued. Returns the messages freed.
    pub fn reap_all(&mut self) -> Result<u64> {
        let mut freed = 0;
        loop {
            let progress = self.reap(self.config.quantum)?;
            freed += progress.elements;
            if progress.done {
                return Ok(freed);
            }
        }
    }
}
