//! Write-time snapshot context
//!
//! Per SNAPSHOT_SUBSETS.md §3: every write carries the snapshot context the
//! client observed — the newest snapshot id and the list of snapshots that
//! exist. The coordinator compares it against the object's snapshot
//! membership to decide whether the write must first materialize a clone.

use crate::object::SnapId;
use serde::{Deserialize, Serialize};

/// Snapshot context valid at write time.
///
/// `snaps` is ordered newest-first, matching the order clones would be
/// walked during reconstruction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapContext {
    /// Newest snapshot id the writer observed.
    pub seq: SnapId,
    /// All snapshot ids that exist, newest first.
    pub snaps: Vec<SnapId>,
}

impl SnapContext {
    /// Creates a context. `snaps` must be newest-first.
    pub fn new(seq: SnapId, snaps: Vec<SnapId>) -> Self {
        Self { seq, snaps }
    }

    /// A context with no snapshots.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if the context is internally consistent: snaps sorted
    /// newest-first and none newer than `seq`.
    pub fn is_valid(&self) -> bool {
        let sorted = self.snaps.windows(2).all(|w| w[0] > w[1]);
        let bounded = self.snaps.first().map_or(true, |&s| s <= self.seq);
        sorted && bounded
    }

    /// Snapshot ids strictly newer than `since`, newest first.
    pub fn snaps_newer_than(&self, since: SnapId) -> Vec<SnapId> {
        self.snaps.iter().copied().filter(|&s| s > since).collect()
    }
}
