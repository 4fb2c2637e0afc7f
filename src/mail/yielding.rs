// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Cooperative yield points for long mailbox operations.
//!
//! A batch operation commits its progress into the mailbox, then calls
//! [`Yielder::yield_point`] with the whole mailbox. The yielder may run
//! other operations against it before returning; the batch re-reads the
//! mailbox afterwards and aborts if something it depends on changed.
//! Returning an error cancels the batch at that point.

use crate::error::Result;
use crate::mail::Mailbox;

/// A scheduler hook called between quanta of a batch operation.
pub trait Yielder<S, B> {
    fn yield_point(&mut self, mailbox: &mut Mailbox<S, B>) -> Result<()>;
}

/// Runs every batch to completion without suspending.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverYield;

impl<S, B> Yielder<S, B> for NeverYield {
    fn yield_point(&mut self, _mailbox: &mut Mailbox<S, B>) -> Result<()> {
        return Ok(());
    }
}

impl<S, B, F> Yielder<S, B> for F
where
    F: FnMut(&mut Mailbox<S, B>) -> Result<()>,
{
    fn yield_point(&mut self, mailbox: &mut Mailbox<S, B>) -> Result<()> {
        return self(mailbox);
    }
}

/// Counts work units and says when a quantum is used up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    quantum: u64,
    used: u64,
}

impl Budget {
    pub fn new(quantum: u64) -> Budget {
        return Budget {
            quantum: quantum.max(1),
            used: 0,
        };
    }

    /// Record `units` of work. Returns true, and starts a fresh quantum,
    /// once the current one is spent.
    pub fn spend(&mut self, units: u64) -> bool {
        self.used += units;
        if self.used >= self.quantum {
            self.used = 0;
            return true;
        }
        return false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_trips_once_per_quantum() {
        let mut budget = Budget::new(3);
        assert!(!budget.spend(1));
        assert!(!budget.spend(1));
        assert!(budget.spend(1));
        assert!(!budget.spend(2));
        assert!(budget.spend(5));
    }
}
