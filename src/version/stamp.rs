//! Version - totally ordered (epoch, counter) stamp
//!
//! Per SHARD_MODEL.md §3:
//! - Totally orders all writes accepted by one shard
//! - Compared by epoch first, then counter
//! - Deterministic: independent of wall-clock time
//! - Owned by value, copied freely
//!
//! This is a PURE TYPE with no behavior beyond construction, access, and
//! comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A totally ordered shard version stamp.
///
/// The epoch is bumped by the external membership authority on replica-set
/// change; the counter is assigned monotonically by the shard's
/// [`VersionSpace`](super::VersionSpace). Field order matters: the derived
/// `Ord` compares epoch before counter.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Version {
    /// Membership epoch in which the stamp was issued.
    pub epoch: u32,
    /// Monotonic counter within the epoch.
    pub counter: u64,
}

impl Version {
    /// The zero version: "before any write".
    pub const ZERO: Version = Version {
        epoch: 0,
        counter: 0,
    };

    /// Creates a version stamp.
    #[inline]
    pub fn new(epoch: u32, counter: u64) -> Self {
        Self { epoch, counter }
    }

    /// True if this is the zero version.
    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'{}", self.epoch, self.counter)
    }
}
