//! Object, replica, and transaction identities
//!
//! Per SHARD_MODEL.md §2:
//! - Every entity is addressed by a value identity, never by reference
//! - Identities are immutable after construction
//! - Map keys throughout the shard are identities, not back-pointers
//!
//! These are PURE TYPES with no behavior beyond construction and access.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot identity within one object's history.
///
/// Snapshot ids are assigned by the external snapshot authority and are
/// strictly increasing over one object's lifetime.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SnapId(u64);

impl SnapId {
    /// Creates a new SnapId with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Which view of an object an identity refers to.
///
/// Per SHARD_MODEL.md §2.2:
/// - `Head` is the mutable, current view
/// - `Clone(snap)` is the immutable view preserved at snapshot `snap`
///
/// A clone is a distinct stored object with its own byte extent; it shares
/// a logical name with its head.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum SnapSelector {
    /// The current, writable view of the object.
    Head,
    /// The immutable view preserved at the given snapshot.
    Clone(SnapId),
}

/// Logical object identity: name plus snapshot selector.
///
/// Per SHARD_MODEL.md §2.1:
/// - Immutable once constructed
/// - Used as the map key for missing sets, recovery cursors, push targets,
///   and read-balance state
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Logical object name.
    name: String,
    /// Which view of the object this identity selects.
    snap: SnapSelector,
}

impl ObjectId {
    /// Identity of the head (current) view of `name`.
    pub fn head(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            snap: SnapSelector::Head,
        }
    }

    /// Identity of the clone of `name` preserved at snapshot `snap`.
    pub fn clone_at(name: impl Into<String>, snap: SnapId) -> Self {
        Self {
            name: name.into(),
            snap: SnapSelector::Clone(snap),
        }
    }

    /// The logical object name shared by head and clones.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The snapshot selector.
    pub fn selector(&self) -> &SnapSelector {
        &self.snap
    }

    /// True if this identity selects the head view.
    pub fn is_head(&self) -> bool {
        matches!(self.snap, SnapSelector::Head)
    }

    /// The snapshot id, if this identity selects a clone.
    pub fn snap(&self) -> Option<SnapId> {
        match self.snap {
            SnapSelector::Head => None,
            SnapSelector::Clone(s) => Some(s),
        }
    }

    /// The head identity sharing this object's name.
    pub fn head_id(&self) -> ObjectId {
        ObjectId::head(self.name.clone())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snap {
            SnapSelector::Head => write!(f, "{}:head", self.name),
            SnapSelector::Clone(s) => write!(f, "{}:{}", self.name, s),
        }
    }
}

/// Replica (peer node) identity within one shard's replica set.
///
/// Assigned by the external membership authority.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ReplicaId(u32);

impl ReplicaId {
    /// Creates a new ReplicaId with the given value.
    #[inline]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Replication transaction identity.
///
/// Per WRITE_PROTOCOL.md §3:
/// - Unique per write, monotonically assigned by the coordinating shard
/// - Keys the in-flight write map and the pending-operation queue
///
/// No Default implementation exists to prevent accidental construction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TxnId(u64);

impl TxnId {
    /// Creates a new TxnId with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_and_clone_identities_are_distinct() {
        let head = ObjectId::head("obj-a");
        let clone = ObjectId::clone_at("obj-a", SnapId::new(4));

        assert_ne!(head, clone);
        assert_eq!(head.name(), clone.name());
        assert!(head.is_head());
        assert!(!clone.is_head());
        assert_eq!(clone.snap(), Some(SnapId::new(4)));
    }

    #[test]
    fn test_head_id_strips_selector() {
        let clone = ObjectId::clone_at("obj-a", SnapId::new(9));
        assert_eq!(clone.head_id(), ObjectId::head("obj-a"));
    }

    #[test]
    fn test_identities_are_usable_as_map_keys() {
        use std::collections::BTreeMap;

        let mut map = BTreeMap::new();
        map.insert(ObjectId::head("a"), 1);
        map.insert(ObjectId::clone_at("a", SnapId::new(1)), 2);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_txn_id_ordering() {
        assert!(TxnId::new(1) < TxnId::new(2));
        assert_eq!(TxnId::new(7), TxnId::new(7));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(ObjectId::head("x").to_string(), "x:head");
        assert_eq!(ObjectId::clone_at("x", SnapId::new(3)).to_string(), "x:s3");
        assert_eq!(ReplicaId::new(2).to_string(), "r2");
        assert_eq!(TxnId::new(5).to_string(), "t5");
    }
}
