// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::error::Result;
use crate::handle::Handle;
use crate::handle::HandleAllocator;
use crate::store::NodeStore;
use crate::store::StoreStats;

/// An in-memory node store.
#[derive(Debug)]
pub struct MemStore<V> {
    slots: FxHashMap<Handle, V>,
    allocator: HandleAllocator,
    /// Maximum number of live handles.
    quota: Option<u64>,
    stats: Cell<StoreStats>,
}

impl<V> Default for MemStore<V> {
    fn default() -> Self {
        return Self::new();
    }
}

impl<V> MemStore<V> {
    pub fn new() -> MemStore<V> {
        return MemStore {
            slots: FxHashMap::default(),
            allocator: HandleAllocator::new(),
            quota: None,
            stats: Cell::new(StoreStats::default()),
        };
    }

    /// Limit the number of live handles.
    pub fn with_quota(mut self, quota: u64) -> MemStore<V> {
        self.quota = Some(quota);
        return self;
    }

    pub fn set_quota(&mut self, quota: Option<u64>) {
        self.quota = quota;
    }

    /// Reset the call counters.
    pub fn reset_stats(&self) {
        self.stats.set(StoreStats::default());
    }

    #[inline]
    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl<V: Clone> NodeStore<V> for MemStore<V> {
    fn allocate(&mut self, value: V) -> Result<Handle> {
        if let Some(available) = self.available() {
            if available == 0 {
                return Err(Error::ResourceExhausted { needed: 1, available });
            }
        }
        self.bump(|stats| stats.allocations += 1);
        let handle = self.allocator.next();
        self.slots.insert(handle, value);
        return Ok(handle);
    }

    fn read(&self, handle: Handle) -> Result<V> {
        self.bump(|stats| stats.reads += 1);
        return self.slots.get(&handle).cloned().ok_or(Error::NotFound(handle));
    }

    fn write(&mut self, handle: Handle, value: V) -> Result<()> {
        self.bump(|stats| stats.writes += 1);
        match self.slots.get_mut(&handle) {
            Some(slot) => {
                *slot = value;
                return Ok(());
            }
            None => return Err(Error::NotFound(handle)),
        }
    }

    fn free(&mut self, handle: Handle) -> Result<()> {
        self.bump(|stats| stats.frees += 1);
        return self.slots.remove(&handle).map(|_| ()).ok_or(Error::NotFound(handle));
    }

    fn handles(&self) -> Result<Vec<Handle>> {
        let mut handles: Vec<Handle> = self.slots.keys().copied().collect();
        handles.sort_unstable();
        return Ok(handles);
    }

    fn available(&self) -> Option<u64> {
        let quota = self.quota?;
        return Some(quota.saturating_sub(self.slots.len() as u64));
    }

    fn stats(&self) -> StoreStats {
        return self.stats.get();
    }

    fn len(&self) -> u64 {
        return self.slots.len() as u64;
    }
}
