//! Clone materialization on the write path
//!
//! Per SNAPSHOT_SUBSETS.md §6: when a write arrives whose snapshot context
//! is newer than the object's membership, the pre-write head state must be
//! preserved first. The clone is materialized inside the same transaction
//! as the write, ahead of it, so replicas apply both atomically. The clone
//! ops never touch the head's own data outside the write's target range.

use super::context::SnapContext;
use super::membership::SnapshotMembership;
use crate::object::{IntervalSet, ObjectId, SnapId};
use crate::storage::Transaction;

/// Record of a clone materialized by [`prepare_clone`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedClone {
    /// Identity of the new clone object.
    pub clone_id: ObjectId,
    /// Snapshot ids the clone preserves (newest first).
    pub snaps: Vec<SnapId>,
}

/// Materializes a clone of `head`'s pre-write state if `snapc` requires
/// one, appending the clone ops to `txn` and updating `membership`.
///
/// Returns `None` when no clone is needed: the context is not newer than
/// the membership, or the object does not exist yet.
pub fn prepare_clone(
    txn: &mut Transaction,
    membership: &mut SnapshotMembership,
    head: &ObjectId,
    snapc: &SnapContext,
) -> Option<PreparedClone> {
    if !membership.needs_clone(snapc) {
        return None;
    }

    let snaps = snapc.snaps_newer_than(membership.seq());
    let clone_id = ObjectId::clone_at(head.name(), snapc.seq);
    let extent = IntervalSet::from_range(0, membership.head_size());

    txn.clone_range(head.clone(), clone_id.clone(), extent);
    txn.set_snaps(clone_id.clone(), snaps.clone());
    membership.freeze_head(snapc.seq, snaps.clone());

    Some(PreparedClone { clone_id, snaps })
}
