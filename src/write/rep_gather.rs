//! In-flight write state
//!
//! Per WRITE_PROTOCOL.md §2, one [`WriteOperation`] tracks a single
//! replicated write from acceptance to destruction. Completion is a pure
//! function of its wait sets:
//! - ack goes out once every replica has ordered the write
//! - commit goes out once every replica has durably applied it
//! - the record is destroyed only when both wait sets are empty
//!
//! Both responses additionally require the local apply to have landed; the
//! primary never reports a state it has not itself reached.

use crate::messages::RequestId;
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::snapshots::{SnapContext, SnapshotMembership};
use crate::storage::Transaction;
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};

/// One replicated write in flight.
///
/// Wait-set invariants:
/// - `waitfor_commit` starts equal to `waitfor_ack`; a replica leaves
///   `waitfor_ack` no later than it leaves `waitfor_commit`
/// - a commit from a replica implies its ack
/// - `at_version > old_version` always
#[derive(Debug)]
pub struct WriteOperation {
    pub(crate) request: RequestId,
    pub(crate) tid: TxnId,
    pub(crate) object: ObjectId,
    pub(crate) txn: Transaction,
    /// Replicas the write was (or will be) issued to, fixed at acceptance.
    pub(crate) replicas: BTreeSet<ReplicaId>,
    pub(crate) waitfor_ack: BTreeSet<ReplicaId>,
    pub(crate) waitfor_commit: BTreeSet<ReplicaId>,
    /// Local transaction durably applied.
    pub(crate) applied: bool,
    pub(crate) old_version: Version,
    pub(crate) at_version: Version,
    /// Snapshot membership of the object as of this write.
    pub(crate) membership_at_write: SnapshotMembership,
    pub(crate) snapc: SnapContext,
    pub(crate) sent_ack: bool,
    pub(crate) sent_commit: bool,
    /// Version through which the local log is stable.
    pub(crate) local_complete_thru: Version,
    /// Per-replica stable-through versions reported with commits.
    pub(crate) replica_complete_thru: BTreeMap<ReplicaId, Version>,
}

impl WriteOperation {
    /// Creates the record at acceptance time. Both wait sets start as the
    /// full replica set.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        request: RequestId,
        tid: TxnId,
        object: ObjectId,
        txn: Transaction,
        replicas: BTreeSet<ReplicaId>,
        old_version: Version,
        at_version: Version,
        membership_at_write: SnapshotMembership,
        snapc: SnapContext,
    ) -> Self {
        debug_assert!(at_version > old_version);
        Self {
            request,
            tid,
            object,
            txn,
            waitfor_ack: replicas.clone(),
            waitfor_commit: replicas.clone(),
            replicas,
            applied: false,
            old_version,
            at_version,
            membership_at_write,
            snapc,
            sent_ack: false,
            sent_commit: false,
            local_complete_thru: Version::ZERO,
            replica_complete_thru: BTreeMap::new(),
        }
    }

    pub fn request(&self) -> RequestId {
        self.request
    }

    pub fn tid(&self) -> TxnId {
        self.tid
    }

    pub fn object(&self) -> &ObjectId {
        &self.object
    }

    pub fn old_version(&self) -> Version {
        self.old_version
    }

    pub fn at_version(&self) -> Version {
        self.at_version
    }

    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn sent_ack(&self) -> bool {
        self.sent_ack
    }

    pub fn sent_commit(&self) -> bool {
        self.sent_commit
    }

    pub fn waitfor_ack(&self) -> &BTreeSet<ReplicaId> {
        &self.waitfor_ack
    }

    pub fn waitfor_commit(&self) -> &BTreeSet<ReplicaId> {
        &self.waitfor_commit
    }

    /// True once the ack may go out: every replica has ordered the write
    /// and no response has been sent yet.
    pub fn can_send_ack(&self) -> bool {
        !self.sent_ack && !self.sent_commit && self.waitfor_ack.is_empty()
    }

    /// True once the commit may go out: both wait sets are empty and no
    /// commit has been sent yet.
    pub fn can_send_commit(&self) -> bool {
        !self.sent_commit && self.waitfor_ack.is_empty() && self.waitfor_commit.is_empty()
    }

    /// True once the record may be destroyed.
    pub fn can_delete(&self) -> bool {
        self.waitfor_ack.is_empty() && self.waitfor_commit.is_empty()
    }

    /// True if this write completed with fewer replicas durable than it
    /// was issued to.
    pub fn is_degraded(&self) -> bool {
        self.replica_complete_thru.len() < self.replicas.len()
    }

    /// The version through which every participant's log is known stable:
    /// the minimum over the local log and every replica that reported.
    ///
    /// Replicas that have not committed yet pin this at [`Version::ZERO`];
    /// log trimming must not outrun the slowest participant.
    pub fn min_complete_thru(&self) -> Version {
        let mut min = self.local_complete_thru;
        for replica in &self.replicas {
            let reported = self
                .replica_complete_thru
                .get(replica)
                .copied()
                .unwrap_or(Version::ZERO);
            if reported < min {
                min = reported;
            }
        }
        min
    }

    /// Removes a failed replica from both wait sets. Returns true if
    /// either set shrank.
    pub(crate) fn removed(&mut self, replica: ReplicaId) -> bool {
        let was_waiting = self.waitfor_ack.remove(&replica);
        self.waitfor_commit.remove(&replica) || was_waiting
    }

    /// Marks `replica`'s ack received. Returns true if the wait set shrank.
    pub(crate) fn ack_from(&mut self, replica: ReplicaId) -> bool {
        self.waitfor_ack.remove(&replica)
    }

    /// Marks `replica`'s commit received. A commit implies the ack.
    /// Returns true if either wait set shrank.
    pub(crate) fn commit_from(&mut self, replica: ReplicaId, complete_thru: Version) -> bool {
        let acked = self.waitfor_ack.remove(&replica);
        let committed = self.waitfor_commit.remove(&replica);
        if committed {
            self.replica_complete_thru.insert(replica, complete_thru);
        }
        acked || committed
    }
}
