// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Node persistence.
//!
//! A [`NodeStore`] maps opaque [`Handle`]s to payloads. Every call is
//! synchronous and durable on return; there is no write-back cache, so a
//! crash between two calls leaves the store readable (if possibly
//! inconsistent, which is what repair is for).
//!
//! Two implementations ship with the crate:
//! - [`MemStore`]: a hash map, with an optional allocation quota
//! - [`FileStore`]: one checksummed file per node in a directory

use serde::Serialize;

use crate::error::Result;
use crate::handle::Handle;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemStore;

/// Counters of store calls, for cost assertions and operator stats.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub allocations: u64,
    pub frees: u64,
}

impl StoreStats {
    /// Total number of store calls.
    pub fn touches(&self) -> u64 {
        return self.reads + self.writes + self.allocations + self.frees;
    }

    /// Calls that changed the store.
    pub fn mutations(&self) -> u64 {
        return self.writes + self.allocations + self.frees;
    }

    /// Counters accumulated since `earlier` was captured.
    pub fn since(&self, earlier: &StoreStats) -> StoreStats {
        return StoreStats {
            reads: self.reads - earlier.reads,
            writes: self.writes - earlier.writes,
            allocations: self.allocations - earlier.allocations,
            frees: self.frees - earlier.frees,
        };
    }
}

/// Durable handle-to-payload storage.
pub trait NodeStore<V> {
    /// Store `value` under a fresh handle.
    ///
    /// Fails with `ResourceExhausted` when the quota is spent.
    fn allocate(&mut self, value: V) -> Result<Handle>;

    /// Fetch the payload for `handle`; `NotFound` if it is unknown or freed.
    fn read(&self, handle: Handle) -> Result<V>;

    /// Replace the payload of a live handle.
    fn write(&mut self, handle: Handle, value: V) -> Result<()>;

    /// Release a handle. It is never handed out again.
    fn free(&mut self, handle: Handle) -> Result<()>;

    /// Every live handle, ascending.
    fn handles(&self) -> Result<Vec<Handle>>;

    /// Allocations still permitted, or `None` when unlimited.
    fn available(&self) -> Option<u64>;

    fn stats(&self) -> StoreStats;

    /// Number of live handles.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        return self.len() == 0;
    }
}
