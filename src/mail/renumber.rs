// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Renumbering: make message numbers consecutive again after expunges.
//!
//! The scan starts at the first message whose number is out of sequence,
//! found by descending on first-key summaries, and rewrites numbers one
//! message at a time. The scan yields between quanta. If a removal was
//! staged while it was suspended, it gives up with [`Error::Aborted`]
//! rather than renumber ranks that may no longer mean what they did.

use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::mail::Access;
use crate::mail::Body;
use crate::mail::Budget;
use crate::mail::Mailbox;
use crate::mail::Message;
use crate::mail::Yielder;
use crate::node::Node;
use crate::store::NodeStore;

/// Outcome of [`Mailbox::renumber`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RenumberReport {
    /// Rank where the first out-of-sequence number was found.
    pub first_rank: Option<u64>,
    /// Messages whose number changed.
    pub renumbered: u64,
}

impl<S, B> Mailbox<S, B>
where
    S: NodeStore<Node<Message>>,
    B: NodeStore<Body>,
{
    /// Rank of the first message whose number is not `starting_at + rank - 1`.
    pub fn first_out_of_sequence(&self, starting_at: u64) -> Result<Option<u64>> {
        let Some(root) = self.messages.root else {
            return Ok(None);
        };
        return self.out_of_sequence(root, self.messages.height, 0, starting_at);
    }

    fn out_of_sequence(&self, handle: Handle, height: u32, before: u64, starting_at: u64) -> Result<Option<u64>> {
        match self.list.read_at(handle, height)? {
            Node::Leaf(messages) => {
                for (i, message) in messages.iter().enumerate() {
                    let rank = before + i as u64 + 1;
                    if message.number != starting_at + rank - 1 {
                        return Ok(Some(rank));
                    }
                }
                return Ok(None);
            }
            Node::Internal(children) => {
                // Numbers are unique and ascending, so if two neighbouring
                // children both start in sequence, everything in the first
                // is in sequence too.
                let mut offset = before;
                let mut previous: Option<(Handle, u64)> = None;
                for child in &children {
                    if child.first.number != starting_at + offset {
                        let Some((handle, start)) = previous else {
                            return Ok(Some(offset + 1));
                        };
                        let inside = self.out_of_sequence(handle, height - 1, start, starting_at)?;
                        return Ok(Some(inside.unwrap_or(offset + 1)));
                    }
                    previous = Some((child.handle, offset));
                    offset += child.count;
                }
                let Some((handle, start)) = previous else {
                    return Ok(None);
                };
                return self.out_of_sequence(handle, height - 1, start, starting_at);
            }
        }
    }

    /// Rewrite message numbers so the message at rank r is numbered
    /// `starting_at + r - 1`.
    ///
    /// Refuses to start while removals are staged. Progress made before an
    /// abort or cancellation is committed; numbers stay ascending throughout.
    pub fn renumber<Y>(&mut self, access: &Access, starting_at: u64, yielder: &mut Y) -> Result<RenumberReport>
    where
        Y: Yielder<S, B>,
    {
        access.check(self.owner)?;
        if !self.messages_going.is_empty() {
            return Err(Error::Aborted {
                processed: 0,
                reason: "removals are staged",
            });
        }
        let mut report = RenumberReport::default();
        let Some(first) = self.first_out_of_sequence(starting_at)? else {
            return Ok(report);
        };
        report.first_rank = Some(first);

        let mut budget = Budget::new(self.config.quantum);
        let mut rank = first;
        let mut cursor = self.list.start(&self.messages, rank, self.messages.count)?;
        'scan: loop {
            let batch = self
                .list
                .next(&mut cursor)
                .map_err(|e| e.in_batch(report.renumbered))?;
            let Some(batch) = batch else {
                break;
            };
            for mut message in batch {
                let expected = starting_at + rank - 1;
                if message.number != expected {
                    message.number = expected;
                    self.messages = self
                        .list
                        .set_nth(&self.messages, rank, message)
                        .map_err(|e| e.in_batch(report.renumbered))?;
                    report.renumbered += 1;
                }
                rank += 1;

                if budget.spend(1) {
                    let count = self.messages.count;
                    yielder
                        .yield_point(self)
                        .map_err(|e| e.in_batch(report.renumbered))?;
                    if !self.messages_going.is_empty() {
                        warn!(renumbered = report.renumbered, "removal staged during renumber");
                        return Err(Error::Aborted {
                            processed: report.renumbered,
                            reason: "a removal was staged during renumbering",
                        });
                    }
                    // Receiving only appends, so the ranks already done must
                    // still hold the numbers just written.
                    let settled = self.messages.count >= count
                        && self
                            .holds_number(rank - 1, starting_at + rank - 2)
                            .map_err(|e| e.in_batch(report.renumbered))?;
                    if !settled {
                        warn!(renumbered = report.renumbered, "messages removed during renumber");
                        return Err(Error::Aborted {
                            processed: report.renumbered,
                            reason: "messages were removed during renumbering",
                        });
                    }
                    if rank > self.messages.count {
                        break 'scan;
                    }
                    cursor = self
                        .list
                        .start(&self.messages, rank, self.messages.count)
                        .map_err(|e| e.in_batch(report.renumbered))?;
                    continue 'scan;
                }
            }
        }
        info!(
            owner = %self.owner,
            first = first,
            renumbered = report.renumbered,
            "renumbered messages"
        );
        return Ok(report);
    }

    fn holds_number(&self, rank: u64, number: u64) -> Result<bool> {
        if rank == 0 || rank > self.messages.count {
            return Ok(false);
        }
        return Ok(self.list.find_nth(&self.messages, rank)?.number == number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailboxConfig;
    use crate::config::TreeConfig;
    use crate::mail::Incoming;
    use crate::mail::NeverYield;
    use crate::mail::Principal;
    use crate::store::MemStore;

    type TestMailbox = Mailbox<MemStore<Node<Message>>, MemStore<Body>>;

    fn filled(n: u64) -> (TestMailbox, Access) {
        let config = MailboxConfig::new()
            .with_tree(TreeConfig::new().with_leaf_size(4).with_node_size(3))
            .with_quantum(5);
        let mut mailbox = Mailbox::new(Principal(1), config, MemStore::new(), MemStore::new());
        let access = Access::new(Principal(1));
        mailbox
            .receive_batch(&access, vec![Incoming::new(0); n as usize], &mut NeverYield)
            .unwrap();
        return (mailbox, access);
    }

    #[test]
    fn finds_the_first_gap() {
        let (mut mailbox, access) = filled(60);
        assert_eq!(mailbox.first_out_of_sequence(1).unwrap(), None);
        mailbox.rm_message_seq(&access, &"37-38".parse().unwrap(), &mut NeverYield).unwrap();
        mailbox.expunge_rmm(&access).unwrap();
        assert_eq!(mailbox.first_out_of_sequence(1).unwrap(), Some(37));
        assert_eq!(mailbox.first_out_of_sequence(2).unwrap(), Some(1));
    }

    #[test]
    fn renumbers_from_the_gap() {
        let (mut mailbox, access) = filled(60);
        mailbox.rm_message_seq(&access, &"10, 40-41".parse().unwrap(), &mut NeverYield).unwrap();
        mailbox.expunge_rmm(&access).unwrap();
        let report = mailbox.renumber(&access, 1, &mut NeverYield).unwrap();
        assert_eq!(report.first_rank, Some(10));
        assert_eq!(report.renumbered, 48);
        let numbers: Vec<u64> = mailbox.messages(1, 57).unwrap().iter().map(|m| m.number).collect();
        assert_eq!(numbers, (1..=57).collect::<Vec<_>>());
        assert_eq!(mailbox.verify().unwrap(), vec![]);
    }

    #[test]
    fn refuses_with_staged_removals() {
        let (mut mailbox, access) = filled(10);
        mailbox.rm_message_seq(&access, &"2".parse().unwrap(), &mut NeverYield).unwrap();
        assert!(matches!(
            mailbox.renumber(&access, 1, &mut NeverYield),
            Err(Error::Aborted { processed: 0, .. })
        ));
    }

    #[test]
    fn cancellation_keeps_partial_progress() {
        let (mut mailbox, access) = filled(30);
        mailbox.rm_message_seq(&access, &"1-3".parse().unwrap(), &mut NeverYield).unwrap();
        mailbox.expunge_rmm(&access).unwrap();
        let mut cancel = |_: &mut TestMailbox| -> Result<()> { Err(Error::Cancelled) };
        let err = mailbox.renumber(&access, 1, &mut cancel).unwrap_err();
        assert_eq!(err.processed(), Some(5));
        assert!(matches!(err.root_cause(), Error::Cancelled));
        assert_eq!(mailbox.message(5).unwrap().number, 5);
        assert_eq!(mailbox.message(6).unwrap().number, 9);
        assert_eq!(mailbox.verify().unwrap(), vec![]);
    }

    #[test]
    fn aborts_when_messages_vanish_during_a_yield() {
        let (mut mailbox, access) = filled(30);
        mailbox.rm_message_seq(&access, &"1-3".parse().unwrap(), &mut NeverYield).unwrap();
        mailbox.expunge_rmm(&access).unwrap();

        let mut yields = 0;
        let mut delete_and_expunge = |mailbox: &mut TestMailbox| -> Result<()> {
            yields += 1;
            if yields == 1 {
                mailbox.rm_message_seq(&access, &"1".parse().unwrap(), &mut NeverYield)?;
                mailbox.expunge_rmm(&access)?;
            }
            return Ok(());
        };
        let err = mailbox.renumber(&access, 1, &mut delete_and_expunge).unwrap_err();
        assert!(matches!(err, Error::Aborted { processed: 5, .. }), "{err}");
        assert_eq!(mailbox.verify().unwrap(), vec![]);
        let numbers: Vec<u64> = mailbox.messages(1, 26).unwrap().iter().map(|m| m.number).collect();
        let mut expected = vec![2, 3, 4, 5];
        expected.extend(9..=30);
        assert_eq!(numbers, expected);

        mailbox.renumber(&access, 1, &mut NeverYield).unwrap();
        let numbers: Vec<u64> = mailbox.messages(1, 26).unwrap().iter().map(|m| m.number).collect();
        assert_eq!(numbers, (1..=26).collect::<Vec<_>>());
    }
}
