// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Error taxonomy shared by the node stores, the tree, and the mailbox.

use thiserror::Error;

use crate::handle::Handle;

/// Result type for biglist operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or mutating a node list.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller holds no rights over the owning mailbox.
    #[error("permission denied for principal #{principal}")]
    PermissionDenied {
        /// The principal that attempted the mutation.
        principal: u64,
    },

    /// A handle has no payload: it was never allocated or was freed.
    #[error("no node stored under handle {0} (run a repair to reconcile the tree)")]
    NotFound(Handle),

    /// A node's shape does not match what its position in the tree requires.
    #[error("malformed node {handle}: {reason}")]
    MalformedNode {
        /// The offending node.
        handle: Handle,
        /// Description of the mismatch.
        reason: String,
    },

    /// The store cannot allocate the nodes an operation needs.
    #[error("node quota exhausted: need {needed}, {available} available")]
    ResourceExhausted {
        /// Allocations the operation may perform.
        needed: u64,
        /// Allocations the store still permits.
        available: u64,
    },

    /// A rank outside `1..=len`.
    #[error("rank {rank} out of range (len {len})")]
    OutOfRange {
        /// The requested rank.
        rank: u64,
        /// Number of elements in the tree.
        len: u64,
    },

    /// The operation stopped because the mailbox changed underneath it.
    #[error("aborted after {processed} elements: {reason}")]
    Aborted {
        /// Elements handled before the abort.
        processed: u64,
        /// What changed.
        reason: &'static str,
    },

    /// The host killed the operation at a yield point.
    #[error("cancelled at a yield point")]
    Cancelled,

    /// An irreversible operation ran without enough confirmations.
    #[error("operation needs {needed} confirmations, got {given}")]
    ConsentRequired {
        /// Confirmations required.
        needed: u8,
        /// Confirmations supplied.
        given: u8,
    },

    /// A multi-quantum batch failed part way through. Everything counted in
    /// `processed` is committed and the tree is consistent.
    #[error("batch stopped after {processed} elements: {source}")]
    Batch {
        /// Elements committed before the failure.
        processed: u64,
        /// The underlying failure.
        source: Box<Error>,
    },

    /// Filesystem failure in a persistent store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding failure in a persistent store.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(handle: Handle, reason: impl Into<String>) -> Error {
        return Error::MalformedNode {
            handle,
            reason: reason.into(),
        };
    }

    /// Wrap an error with the number of elements committed before it.
    ///
    /// Nested batch errors keep the innermost source but the outermost count.
    pub(crate) fn in_batch(self, processed: u64) -> Error {
        let source = match self {
            Error::Batch { source, .. } => source,
            other => Box::new(other),
        };
        return Error::Batch { processed, source };
    }

    /// Elements committed before the failure, if the error carries a count.
    pub fn processed(&self) -> Option<u64> {
        match self {
            Error::Batch { processed, .. } | Error::Aborted { processed, .. } => {
                return Some(*processed);
            }
            _ => return None,
        }
    }

    /// The innermost cause, looking through batch wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Batch { source, .. } => return source.root_cause(),
            other => return other,
        }
    }
}
