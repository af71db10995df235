//! Replica-set membership and missing-object bookkeeping
//!
//! Per SHARD_MODEL.md §6.3, membership is supplied by an external
//! authority and never inferred here:
//! - the replica set (and its epoch) arrives via membership-change
//!   notifications
//! - the missing-object information (who is missing what, as of which
//!   version) arrives alongside and is consumed read-mostly by recovery
//!
//! These types carry no policy. Admission and repair decisions live in the
//! write coordinator and the recovery engine.

use crate::object::{ObjectId, ReplicaId};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The replica set of one shard, as of one membership epoch.
///
/// `primary` coordinates; `peers` hold copies and never includes the
/// primary itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMembership {
    epoch: u32,
    primary: ReplicaId,
    peers: BTreeSet<ReplicaId>,
}

impl ShardMembership {
    /// Creates a membership view. The primary is removed from `peers` if
    /// the authority included it.
    pub fn new(epoch: u32, primary: ReplicaId, mut peers: BTreeSet<ReplicaId>) -> Self {
        peers.remove(&primary);
        Self {
            epoch,
            primary,
            peers,
        }
    }

    /// Membership epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// The coordinating replica.
    pub fn primary(&self) -> ReplicaId {
        self.primary
    }

    /// Non-coordinating replicas.
    pub fn peers(&self) -> &BTreeSet<ReplicaId> {
        &self.peers
    }

    /// True if `replica` participates in this epoch (primary or peer).
    pub fn contains(&self, replica: ReplicaId) -> bool {
        replica == self.primary || self.peers.contains(&replica)
    }

    /// Peers present in `self` but absent from `next` (ejected by the
    /// membership change).
    pub fn ejected_peers(&self, next: &ShardMembership) -> Vec<ReplicaId> {
        self.peers
            .iter()
            .copied()
            .filter(|r| !next.contains(*r))
            .collect()
    }
}

/// The set of objects one node is missing, each as of the version it needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSet {
    need: BTreeMap<ObjectId, Version>,
}

impl MissingSet {
    /// Creates an empty missing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing is missing.
    pub fn is_empty(&self) -> bool {
        self.need.is_empty()
    }

    /// Number of missing objects.
    pub fn len(&self) -> usize {
        self.need.len()
    }

    /// True if `object` is missing.
    pub fn is_missing(&self, object: &ObjectId) -> bool {
        self.need.contains_key(object)
    }

    /// The version `object` must be brought to, if missing.
    pub fn need_version(&self, object: &ObjectId) -> Option<Version> {
        self.need.get(object).copied()
    }

    /// Marks `object` missing as of `version`. A newer need replaces an
    /// older one; an older need is ignored.
    pub fn add(&mut self, object: ObjectId, version: Version) {
        let entry = self.need.entry(object).or_insert(version);
        if version > *entry {
            *entry = version;
        }
    }

    /// Marks `object` recovered. Returns true if it was missing.
    pub fn got(&mut self, object: &ObjectId) -> bool {
        self.need.remove(object).is_some()
    }

    /// Iterates missing objects in deterministic (key) order.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, Version)> + '_ {
        self.need.iter().map(|(o, &v)| (o, v))
    }
}

/// Missing-object information for the whole shard: the primary's own
/// missing set plus one per peer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInfo {
    own: MissingSet,
    peers: BTreeMap<ReplicaId, MissingSet>,
}

impl MissingInfo {
    /// Creates missing info from the authority's report.
    pub fn new(own: MissingSet, peers: BTreeMap<ReplicaId, MissingSet>) -> Self {
        Self { own, peers }
    }

    /// The primary's own missing set.
    pub fn own(&self) -> &MissingSet {
        &self.own
    }

    /// Mutable access to the primary's own missing set.
    pub fn own_mut(&mut self) -> &mut MissingSet {
        &mut self.own
    }

    /// A peer's missing set, empty if the peer reported nothing.
    pub fn peer(&self, replica: ReplicaId) -> Option<&MissingSet> {
        self.peers.get(&replica)
    }

    /// Mutable access to a peer's missing set.
    pub fn peer_mut(&mut self, replica: ReplicaId) -> &mut MissingSet {
        self.peers.entry(replica).or_default()
    }

    /// Peers known to be missing `object`, in deterministic order.
    pub fn peers_missing(&self, object: &ObjectId) -> Vec<ReplicaId> {
        self.peers
            .iter()
            .filter(|(_, m)| m.is_missing(object))
            .map(|(&r, _)| r)
            .collect()
    }

    /// Deterministic pull source for `object`: the lowest-id peer in
    /// `membership` that is not missing it.
    ///
    /// Determinism over load-spreading; ties always resolve the same way
    /// so recovery is replayable.
    pub fn pull_source(&self, object: &ObjectId, membership: &ShardMembership) -> Option<ReplicaId> {
        membership
            .peers()
            .iter()
            .copied()
            .find(|r| match self.peers.get(r) {
                Some(m) => !m.is_missing(object),
                None => true,
            })
    }
}
