// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Opaque node handles and the monotonic allocator that hands them out.
//!
//! Handles are plain 64-bit counters. For stores that need a printable slot
//! name (file names, operator output) a handle renders as a base-26 string
//! over `a..=z`, with `a` as the zero digit: `0 -> "a"`, `25 -> "z"`,
//! `26 -> "ba"`. Handles are never reused while the allocator lives.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

const ALPHABET: u64 = 26;

/// A reference to a persisted node, stable across restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub u64);

impl Handle {
    /// Render the base-26 slot name for this handle.
    pub fn slot_name(self) -> String {
        let mut digits = Vec::new();
        let mut value = self.0;
        loop {
            digits.push(b'a' + (value % ALPHABET) as u8);
            value /= ALPHABET;
            if value == 0 {
                break;
            }
        }
        digits.reverse();
        // Only ASCII lowercase letters are pushed.
        return digits.into_iter().map(char::from).collect();
    }

    /// Parse a slot name produced by [`Handle::slot_name`].
    pub fn from_slot_name(name: &str) -> Option<Handle> {
        if name.is_empty() || (name.len() > 1 && name.starts_with('a')) {
            return None;
        }
        let mut value: u64 = 0;
        for byte in name.bytes() {
            if !byte.is_ascii_lowercase() {
                return None;
            }
            value = value
                .checked_mul(ALPHABET)?
                .checked_add((byte - b'a') as u64)?;
        }
        return Some(Handle(value));
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.slot_name());
    }
}

/// Hands out strictly increasing handles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub fn new() -> HandleAllocator {
        return HandleAllocator { next: 0 };
    }

    /// Resume an allocator so that it never returns `handle` or anything below it.
    pub fn after(handle: Handle) -> HandleAllocator {
        return HandleAllocator { next: handle.0 + 1 };
    }

    /// Resume from a persisted counter value.
    pub fn starting_at(next: u64) -> HandleAllocator {
        return HandleAllocator { next };
    }

    /// Reserve the next handle.
    pub fn next(&mut self) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        return handle;
    }

    /// The value the next call to [`HandleAllocator::next`] will use.
    pub fn peek(&self) -> u64 {
        return self.next;
    }

    /// Make sure future handles sort after `handle`.
    pub fn bump_past(&mut self, handle: Handle) {
        self.next = self.next.max(handle.0 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_count_in_base_26() {
        assert_eq!(Handle(0).slot_name(), "a");
        assert_eq!(Handle(25).slot_name(), "z");
        assert_eq!(Handle(26).slot_name(), "ba");
        assert_eq!(Handle(27).slot_name(), "bb");
        assert_eq!(Handle(26 * 26).slot_name(), "baa");
    }

    #[test]
    fn slot_names_parse_back() {
        for value in [0u64, 1, 25, 26, 675, 676, 123_456_789] {
            let name = Handle(value).slot_name();
            assert_eq!(Handle::from_slot_name(&name), Some(Handle(value)));
        }
        assert_eq!(Handle::from_slot_name(""), None);
        assert_eq!(Handle::from_slot_name("ab"), None);
        assert_eq!(Handle::from_slot_name("B"), None);
        assert_eq!(Handle::from_slot_name("tmp.node"), None);
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut allocator = HandleAllocator::new();
        let a = allocator.next();
        let b = allocator.next();
        assert!(a < b);

        allocator.bump_past(Handle(100));
        assert_eq!(allocator.next(), Handle(101));
        allocator.bump_past(Handle(3));
        assert_eq!(allocator.next(), Handle(102));
    }
}
