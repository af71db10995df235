//! Ordered, coalescing byte-range sets
//!
//! Per SNAPSHOT_SUBSETS.md §2, all subset arithmetic (head deltas, clone
//! deltas, push payload layout) is performed on interval sets:
//! - ranges are half-open `[start, start + len)`
//! - adjacent and overlapping ranges coalesce on insert
//! - iteration order is ascending by start offset, deterministically

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A set of non-overlapping, non-adjacent byte ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSet {
    // start -> len; invariant: no two entries overlap or touch
    ranges: BTreeMap<u64, u64>,
}

impl IntervalSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding the single range `[start, start + len)`.
    pub fn from_range(start: u64, len: u64) -> Self {
        let mut set = Self::new();
        set.insert(start, len);
        set
    }

    /// True if the set holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of disjoint ranges.
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Total number of bytes covered.
    pub fn total_bytes(&self) -> u64 {
        self.ranges.values().sum()
    }

    /// Iterates ranges as `(start, len)` in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().map(|(&s, &l)| (s, l))
    }

    /// Inserts `[start, start + len)`, coalescing with overlapping or
    /// adjacent ranges. Zero-length inserts are ignored.
    pub fn insert(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        let mut new_start = start;
        let mut new_end = start + len;

        // Merge with a preceding range that overlaps or touches.
        if let Some((&s, &l)) = self.ranges.range(..=new_start).next_back() {
            if s + l >= new_start {
                new_start = s;
                new_end = new_end.max(s + l);
                self.ranges.remove(&s);
            }
        }

        // Absorb following ranges that start at or before the new end.
        let absorbed: Vec<u64> = self
            .ranges
            .range(new_start..=new_end)
            .map(|(&s, _)| s)
            .collect();
        for s in absorbed {
            let l = self.ranges.remove(&s).unwrap_or(0);
            new_end = new_end.max(s + l);
        }

        self.ranges.insert(new_start, new_end - new_start);
    }

    /// True if `[start, start + len)` is fully covered by one range.
    pub fn contains(&self, start: u64, len: u64) -> bool {
        if len == 0 {
            return true;
        }
        match self.ranges.range(..=start).next_back() {
            Some((&s, &l)) => s <= start && start + len <= s + l,
            None => false,
        }
    }

    /// True if every byte of `other` is covered by `self`.
    pub fn covers(&self, other: &IntervalSet) -> bool {
        other.iter().all(|(s, l)| self.contains(s, l))
    }

    /// Adds every range of `other` to `self`.
    pub fn union_with(&mut self, other: &IntervalSet) {
        for (s, l) in other.iter() {
            self.insert(s, l);
        }
    }

    /// Removes every range of `other` from `self`.
    pub fn subtract(&mut self, other: &IntervalSet) {
        for (s, l) in other.iter() {
            self.remove_range(s, l);
        }
    }

    /// Returns the bytes present in both `self` and `other`.
    pub fn intersection(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = IntervalSet::new();
        for (s, l) in self.iter() {
            let end = s + l;
            for (os, ol) in other.iter() {
                let oend = os + ol;
                if oend <= s {
                    continue;
                }
                if os >= end {
                    break;
                }
                let cs = s.max(os);
                let ce = end.min(oend);
                out.insert(cs, ce - cs);
            }
        }
        out
    }

    /// Returns `self − other` without mutating either set.
    pub fn difference(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = self.clone();
        out.subtract(other);
        out
    }

    fn remove_range(&mut self, start: u64, len: u64) {
        if len == 0 {
            return;
        }
        let end = start + len;
        let affected: Vec<(u64, u64)> = self
            .ranges
            .range(..end)
            .filter(|(&s, &l)| s + l > start)
            .map(|(&s, &l)| (s, l))
            .collect();
        for (s, l) in affected {
            self.ranges.remove(&s);
            if s < start {
                self.ranges.insert(s, start - s);
            }
            if s + l > end {
                self.ranges.insert(end, s + l - end);
            }
        }
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (s, l)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}~{}", s, l)?;
        }
        write!(f, "]")
    }
}
