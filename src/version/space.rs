//! VersionSpace - single-owner monotonic version allocation
//!
//! Per SHARD_MODEL.md §3.2:
//! - Exactly one VersionSpace per shard, owned by the write coordinator
//! - Stamps are strictly increasing; no stamp is ever reissued
//! - The epoch only moves forward, and only on membership change
//! - The last accepted version per object is the sole authority for
//!   stale-write detection

use super::stamp::Version;
use crate::object::ObjectId;
use std::collections::BTreeMap;

/// Monotonic (epoch, counter) stamp allocator with per-object tracking.
#[derive(Debug)]
pub struct VersionSpace {
    /// Current membership epoch.
    epoch: u32,
    /// Last stamp issued; the next stamp is strictly greater.
    last_issued: Version,
    /// Last version accepted per object head.
    last_accepted: BTreeMap<ObjectId, Version>,
}

impl VersionSpace {
    /// Creates a version space starting at the given epoch.
    pub fn new(epoch: u32) -> Self {
        Self {
            epoch,
            last_issued: Version::new(epoch, 0),
            last_accepted: BTreeMap::new(),
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Last stamp issued.
    pub fn last_issued(&self) -> Version {
        self.last_issued
    }

    /// Issues the next stamp. Strictly greater than every prior stamp.
    pub fn next(&mut self) -> Version {
        let v = Version::new(self.epoch, self.last_issued.counter + 1);
        debug_assert!(v > self.last_issued);
        self.last_issued = v;
        v
    }

    /// Moves to a new membership epoch.
    ///
    /// Backwards moves are ignored: the external membership authority only
    /// hands out increasing epochs, and a late-arriving notification for an
    /// old epoch must not regress ordering.
    pub fn advance_epoch(&mut self, epoch: u32) {
        if epoch > self.epoch {
            self.epoch = epoch;
            // Counters continue; epoch dominates ordering regardless.
            self.last_issued = Version::new(epoch, self.last_issued.counter);
        }
    }

    /// Last version accepted for `object`, or [`Version::ZERO`] if the
    /// object has never been written through this shard.
    pub fn latest(&self, object: &ObjectId) -> Version {
        self.last_accepted
            .get(object)
            .copied()
            .unwrap_or(Version::ZERO)
    }

    /// Records `version` as the last accepted version for `object`.
    pub fn record_accepted(&mut self, object: ObjectId, version: Version) {
        self.last_accepted.insert(object, version);
    }
}
