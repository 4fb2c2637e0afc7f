// model = "claude-opus-4-5"
// created = "2026-10-16"
// modified = "2026-10-16"
// driver = "Isaac Clayton"

//! Message sequences: sets of ranks stored as disjoint half-open ranges.
//!
//! `[2..4, 5..6]` is the set `{2, 3, 5}` and prints as `2-3, 5`. Ranges are
//! kept sorted, non-empty, and never adjacent, so two equal sets always have
//! equal representations.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// A set of 1-based ranks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageSeq {
    ranges: Vec<Range<u64>>,
}

impl MessageSeq {
    pub fn new() -> MessageSeq {
        return MessageSeq::default();
    }

    /// The ranks `start..end`.
    pub fn from_range(start: u64, end: u64) -> MessageSeq {
        return MessageSeq::from_ranges([start..end]);
    }

    pub fn from_ranks(ranks: impl IntoIterator<Item = u64>) -> MessageSeq {
        return MessageSeq::from_ranges(ranks.into_iter().map(|rank| rank..rank + 1));
    }

    /// Normalize arbitrary, possibly overlapping ranges.
    pub fn from_ranges(ranges: impl IntoIterator<Item = Range<u64>>) -> MessageSeq {
        let mut ranges: Vec<Range<u64>> = ranges.into_iter().filter(|r| r.start < r.end).collect();
        ranges.sort_unstable_by_key(|r| r.start);
        let mut merged: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        return MessageSeq { ranges: merged };
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        return &self.ranges;
    }

    pub fn is_empty(&self) -> bool {
        return self.ranges.is_empty();
    }

    /// Number of ranks in the set.
    pub fn count(&self) -> u64 {
        return self.ranges.iter().map(|r| r.end - r.start).sum();
    }

    pub fn contains(&self, rank: u64) -> bool {
        let index = self.ranges.partition_point(|r| r.end <= rank);
        return self.ranges.get(index).is_some_and(|r| r.start <= rank);
    }

    pub fn first(&self) -> Option<u64> {
        return self.ranges.first().map(|r| r.start);
    }

    pub fn last(&self) -> Option<u64> {
        return self.ranges.last().map(|r| r.end - 1);
    }

    /// Ranks in the set below `rank`.
    fn count_below(&self, rank: u64) -> u64 {
        return self
            .ranges
            .iter()
            .take_while(|r| r.start < rank)
            .map(|r| r.end.min(rank) - r.start)
            .sum();
    }

    pub fn union(&self, other: &MessageSeq) -> MessageSeq {
        return MessageSeq::from_ranges(self.ranges.iter().chain(&other.ranges).cloned());
    }

    pub fn intersection(&self, other: &MessageSeq) -> MessageSeq {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a, b) = (&self.ranges[i], &other.ranges[j]);
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.push(start..end);
            }
            if a.end <= b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        return MessageSeq::from_ranges(out);
    }

    pub fn difference(&self, other: &MessageSeq) -> MessageSeq {
        let mut out = Vec::new();
        let mut j = 0;
        for range in &self.ranges {
            let mut start = range.start;
            while j < other.ranges.len() && other.ranges[j].end <= start {
                j += 1;
            }
            let mut k = j;
            while start < range.end {
                match other.ranges.get(k) {
                    Some(cut) if cut.start < range.end => {
                        if cut.start > start {
                            out.push(start..cut.start);
                        }
                        start = start.max(cut.end);
                        k += 1;
                    }
                    _ => {
                        out.push(start..range.end);
                        break;
                    }
                }
            }
        }
        return MessageSeq::from_ranges(out);
    }

    /// Delete `removed` from the set and shift every later rank down to
    /// close the gaps, as if the removed messages were expunged.
    pub fn remove_and_close(&self, removed: &MessageSeq) -> MessageSeq {
        let survivors = self.difference(removed);
        let shifted = survivors.ranges.iter().map(|r| {
            let shift = removed.count_below(r.start);
            return r.start - shift..r.end - shift;
        });
        return MessageSeq::from_ranges(shifted);
    }

    /// Inverse of [`MessageSeq::remove_and_close`]: open gaps where
    /// `inserted` goes back in, shifting later ranks up. The inserted ranks
    /// themselves are not added.
    pub fn open_and_insert(&self, inserted: &MessageSeq) -> MessageSeq {
        // Where each inserted run starts, in closed coordinates, and the
        // total shift in effect from there on.
        let mut breakpoints = Vec::with_capacity(inserted.ranges.len());
        let mut shift = 0;
        for range in &inserted.ranges {
            let at = range.start - shift;
            shift += range.end - range.start;
            breakpoints.push((at, shift));
        }

        let mut out = Vec::new();
        for range in &self.ranges {
            let mut start = range.start;
            let mut index = breakpoints.partition_point(|&(at, _)| at <= start);
            while start < range.end {
                let offset = if index == 0 { 0 } else { breakpoints[index - 1].1 };
                let end = match breakpoints.get(index) {
                    Some(&(at, _)) if at < range.end => at,
                    _ => range.end,
                };
                out.push(start + offset..end + offset);
                start = end;
                index += 1;
            }
        }
        return MessageSeq::from_ranges(out);
    }

    /// Every rank in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        return self.ranges.iter().flat_map(|r| r.clone());
    }
}

impl fmt::Display for MessageSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if range.end - range.start == 1 {
                write!(f, "{}", range.start)?;
            } else {
                write!(f, "{}-{}", range.start, range.end - 1)?;
            }
        }
        return Ok(());
    }
}

/// Error parsing a message sequence.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid message sequence {text:?}: {reason}")]
pub struct ParseSeqError {
    text: String,
    reason: &'static str,
}

impl FromStr for MessageSeq {
    type Err = ParseSeqError;

    /// Parse inclusive ranks and ranges: `"1, 4-6, 9"`.
    fn from_str(text: &str) -> Result<MessageSeq, ParseSeqError> {
        let fail = |reason| ParseSeqError {
            text: text.to_string(),
            reason,
        };
        let mut ranges = Vec::new();
        for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (lo.trim(), hi.trim()),
                None => (part, part),
            };
            let lo: u64 = lo.parse().map_err(|_| fail("not a number"))?;
            let hi: u64 = hi.parse().map_err(|_| fail("not a number"))?;
            if lo == 0 {
                return Err(fail("ranks start at 1"));
            }
            if lo > hi {
                return Err(fail("range runs backwards"));
            }
            ranges.push(lo..hi + 1);
        }
        return Ok(MessageSeq::from_ranges(ranges));
    }
}
