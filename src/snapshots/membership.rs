//! Snapshot membership: one object's clone history
//!
//! Per SNAPSHOT_SUBSETS.md §4, the shard tracks, per logical object:
//! - the clones that exist (oldest to newest), each with its byte extent
//! - each clone's *delta*: the byte ranges that changed between the next
//!   older snapshot state and this clone's state
//! - the head's delta: the ranges written since the newest clone was taken
//!
//! Deltas are the currency of subset computation. The oldest clone's delta
//! is its full extent: there is no older state to reconstruct from.

use super::context::SnapContext;
use crate::object::{IntervalSet, ObjectId, SnapId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One clone's entry in the membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneInfo {
    /// Snapshot id at which the clone was taken.
    pub snap: SnapId,
    /// Byte extent of the clone.
    pub size: u64,
    /// Ranges that changed between the next older snapshot state and this
    /// clone. Full extent for the oldest clone.
    pub delta: IntervalSet,
    /// Snapshot ids this clone preserves (newest first).
    pub snaps: Vec<SnapId>,
}

/// Snapshot membership for one logical object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMembership {
    /// Newest snapshot id the head has been cloned for.
    seq: SnapId,
    /// Byte extent of the head.
    head_size: u64,
    /// Ranges the head has been written since the newest clone.
    head_delta: IntervalSet,
    /// Clones, oldest to newest.
    clones: Vec<CloneInfo>,
}

impl SnapshotMembership {
    /// Creates an empty membership (object with no snapshot history).
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest snapshot id cloned for.
    pub fn seq(&self) -> SnapId {
        self.seq
    }

    /// Head byte extent.
    pub fn head_size(&self) -> u64 {
        self.head_size
    }

    /// Ranges written to the head since the newest clone.
    pub fn head_delta(&self) -> &IntervalSet {
        &self.head_delta
    }

    /// Clones, oldest to newest.
    pub fn clones(&self) -> &[CloneInfo] {
        &self.clones
    }

    /// True if the object has no clone history.
    pub fn has_clones(&self) -> bool {
        !self.clones.is_empty()
    }

    /// Looks up a clone by snapshot id.
    pub fn clone_info(&self, snap: SnapId) -> Option<&CloneInfo> {
        self.clones.iter().find(|c| c.snap == snap)
    }

    /// Records a head write: grows the extent if needed and accumulates
    /// the written range into the head delta.
    pub fn note_head_write(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        self.head_size = self.head_size.max(offset + len);
        self.head_delta.insert(offset, len);
    }

    /// Freezes the current head state into a clone taken at `seq`.
    ///
    /// The new clone's delta is the head delta (what changed since the
    /// previous clone), or the full extent if this is the first clone. The
    /// head delta resets; subsequent writes accumulate against the new
    /// clone.
    pub fn freeze_head(&mut self, seq: SnapId, snaps: Vec<SnapId>) -> CloneInfo {
        let delta = if self.clones.is_empty() {
            IntervalSet::from_range(0, self.head_size)
        } else {
            self.head_delta.clone()
        };
        let info = CloneInfo {
            snap: seq,
            size: self.head_size,
            delta,
            snaps,
        };
        self.clones.push(info.clone());
        self.head_delta = IntervalSet::new();
        self.seq = seq;
        info
    }

    /// True if `snapc` implies a snapshot was taken since the last clone,
    /// so the next write must materialize one first.
    pub fn needs_clone(&self, snapc: &SnapContext) -> bool {
        snapc.seq > self.seq && self.head_size > 0
    }
}

/// Per-shard registry of snapshot memberships, keyed by object name.
#[derive(Clone, Debug, Default)]
pub struct SnapshotRegistry {
    by_name: BTreeMap<String, SnapshotMembership>,
}

impl SnapshotRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership for `object`'s logical name, if any history exists.
    pub fn get(&self, object: &ObjectId) -> Option<&SnapshotMembership> {
        self.by_name.get(object.name())
    }

    /// Mutable membership for `object`'s logical name, created empty on
    /// first touch.
    pub fn get_or_default(&mut self, object: &ObjectId) -> &mut SnapshotMembership {
        self.by_name.entry(object.name().to_string()).or_default()
    }

    /// Installs a membership wholesale (recovery install path).
    pub fn install(&mut self, name: impl Into<String>, membership: SnapshotMembership) {
        self.by_name.insert(name.into(), membership);
    }
}
