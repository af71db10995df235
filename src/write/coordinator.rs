//! Write coordination on the primary
//!
//! Per WRITE_PROTOCOL.md §3, the coordinator owns every client write from
//! acceptance to retirement:
//! - stale-version rejection against the version space
//! - transaction id and version stamp allocation
//! - issue to replicas and local storage
//! - wait-set bookkeeping as acks, commits, and failures arrive
//! - at-most-once ack and commit toward the client
//! - per-object ordering via the pending queue
//!
//! The coordinator never blocks: everything outbound is an [`Effect`].

use super::errors::{WriteError, WriteResult};
use super::pending::PendingOperationQueue;
use super::rep_gather::WriteOperation;
use crate::messages::{ClientResponse, Effect, PeerMessage, ReplicateMessage, RequestId};
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::observability::MetricsRegistry;
use crate::snapshots::{SnapContext, SnapshotMembership};
use crate::storage::{ApplyResult, Transaction};
use crate::version::{Version, VersionSpace};
use std::collections::{BTreeMap, BTreeSet};

/// How an accepted write entered the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteAdmission {
    /// Issued to replicas and local storage immediately.
    Issued(TxnId),
    /// Accepted and stamped, parked behind an earlier write on the same
    /// object.
    Deferred(TxnId),
}

impl WriteAdmission {
    /// The transaction id assigned at acceptance.
    pub fn tid(&self) -> TxnId {
        match *self {
            WriteAdmission::Issued(tid) | WriteAdmission::Deferred(tid) => tid,
        }
    }
}

/// Primary-side write pipeline for one shard.
#[derive(Debug)]
pub struct WriteCoordinator {
    self_id: ReplicaId,
    versions: VersionSpace,
    next_tid: u64,
    /// Writes issued to replicas and local storage, by transaction id.
    ops: BTreeMap<TxnId, WriteOperation>,
    /// Accepted writes parked behind an in-flight one.
    pending: PendingOperationQueue,
    /// Newest accepted write per object, issued or parked. New writes on
    /// the same object park behind this one.
    newest_for_object: BTreeMap<ObjectId, TxnId>,
    /// Currently issued write per object.
    active_for_object: BTreeMap<ObjectId, TxnId>,
}

impl WriteCoordinator {
    /// Creates a coordinator for the given primary at the given epoch.
    pub fn new(self_id: ReplicaId, epoch: u32) -> Self {
        Self {
            self_id,
            versions: VersionSpace::new(epoch),
            next_tid: 0,
            ops: BTreeMap::new(),
            pending: PendingOperationQueue::new(),
            newest_for_object: BTreeMap::new(),
            active_for_object: BTreeMap::new(),
        }
    }

    /// Rejects a write whose `old_version` does not match the last
    /// accepted version of `object`. Callers use this as a pre-flight
    /// guard before building the transaction; [`Self::begin_write`]
    /// re-checks authoritatively.
    pub fn check_version(&self, object: &ObjectId, old_version: Version) -> WriteResult<()> {
        let latest = self.versions.latest(object);
        if old_version != latest {
            return Err(WriteError::StaleVersion {
                expected: old_version,
                latest,
            });
        }
        Ok(())
    }

    /// Accepts a write: stale check, tid and version stamp allocation,
    /// then either immediate issue or parking behind the newest accepted
    /// write on the same object.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_write(
        &mut self,
        request: RequestId,
        object: ObjectId,
        txn: Transaction,
        old_version: Version,
        membership_at_write: SnapshotMembership,
        snapc: SnapContext,
        replicas: BTreeSet<ReplicaId>,
    ) -> WriteResult<(WriteAdmission, Vec<Effect>)> {
        self.check_version(&object, old_version)?;

        self.next_tid += 1;
        let tid = TxnId::new(self.next_tid);
        let at_version = self.versions.next();
        self.versions.record_accepted(object.clone(), at_version);

        let op = WriteOperation::new(
            request,
            tid,
            object.clone(),
            txn,
            replicas,
            old_version,
            at_version,
            membership_at_write,
            snapc,
        );

        let mut effects = Vec::new();
        let admission = match self.newest_for_object.insert(object, tid) {
            Some(prior) => {
                self.pending.defer(prior, op);
                WriteAdmission::Deferred(tid)
            }
            None => {
                self.activate(op, &mut effects);
                WriteAdmission::Issued(tid)
            }
        };
        Ok((admission, effects))
    }

    /// Local storage completion for `tid`. A failed apply is terminal for
    /// that write; the client gets an error and the next parked write on
    /// the object is issued.
    pub fn on_local_apply(
        &mut self,
        tid: TxnId,
        result: ApplyResult,
        metrics: &MetricsRegistry,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        match result {
            ApplyResult::Applied => {
                if let Some(op) = self.ops.get_mut(&tid) {
                    op.applied = true;
                    op.local_complete_thru = op.at_version;
                    self.maybe_complete(tid, metrics, &mut effects);
                }
            }
            ApplyResult::Failed { reason } => {
                let err = WriteError::StorageApplyFailure { tid, reason };
                self.fail(tid, &err.to_string(), &mut effects);
            }
        }
        effects
    }

    /// A replica reported the write ordered.
    pub fn on_replica_ack(
        &mut self,
        tid: TxnId,
        from: ReplicaId,
        metrics: &MetricsRegistry,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(op) = self.ops.get_mut(&tid) {
            if op.ack_from(from) {
                self.maybe_complete(tid, metrics, &mut effects);
            }
        }
        effects
    }

    /// A replica reported the write durably applied. The commit implies
    /// the ack; `complete_thru` is the sender's stable-through version.
    pub fn on_replica_commit(
        &mut self,
        tid: TxnId,
        from: ReplicaId,
        complete_thru: Version,
        metrics: &MetricsRegistry,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(op) = self.ops.get_mut(&tid) {
            if op.commit_from(from, complete_thru) {
                self.maybe_complete(tid, metrics, &mut effects);
            }
        }
        effects
    }

    /// Removes a failed replica from the wait sets of every in-flight and
    /// parked write, completing any write that was only waiting on it.
    ///
    /// Completions unblocked this way are degraded: the write is reported
    /// done with fewer durable copies than it was issued with. Re-widening
    /// is recovery's job, not the write path's.
    pub fn on_replica_failure(
        &mut self,
        replica: ReplicaId,
        metrics: &MetricsRegistry,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        for op in self.pending.iter_mut() {
            op.removed(replica);
        }
        let tids: Vec<TxnId> = self.ops.keys().copied().collect();
        for tid in tids {
            let changed = match self.ops.get_mut(&tid) {
                Some(op) => op.removed(replica),
                None => false,
            };
            if changed {
                self.maybe_complete(tid, metrics, &mut effects);
            }
        }
        effects
    }

    /// Moves the version space to a new membership epoch.
    pub fn advance_epoch(&mut self, epoch: u32) {
        self.versions.advance_epoch(epoch);
    }

    /// True if `tid` names an issued, still-live write.
    pub fn owns(&self, tid: TxnId) -> bool {
        self.ops.contains_key(&tid)
    }

    /// The issued write for `tid`, if still live.
    pub fn op(&self, tid: TxnId) -> Option<&WriteOperation> {
        self.ops.get(&tid)
    }

    /// True if a write on `object` is issued or parked.
    pub fn has_in_flight(&self, object: &ObjectId) -> bool {
        self.newest_for_object.contains_key(object)
    }

    /// Issued writes currently live.
    pub fn in_flight_count(&self) -> usize {
        self.ops.len()
    }

    /// Accepted writes parked behind an earlier one.
    pub fn deferred_count(&self) -> usize {
        self.pending.len()
    }

    /// Last accepted version for `object`.
    pub fn latest_accepted(&self, object: &ObjectId) -> Version {
        self.versions.latest(object)
    }

    /// The version through which every participant of every in-flight
    /// write is known stable, or `None` when nothing is in flight. This
    /// bounds how far the host may trim its operation log.
    pub fn min_complete_thru(&self) -> Option<Version> {
        self.ops.values().map(WriteOperation::min_complete_thru).min()
    }

    /// Issues `op`: replicate to every participant, then submit locally.
    fn activate(&mut self, op: WriteOperation, effects: &mut Vec<Effect>) {
        for &replica in &op.replicas {
            effects.push(Effect::SendPeer {
                to: replica,
                message: PeerMessage::Replicate(ReplicateMessage {
                    tid: op.tid,
                    from: self.self_id,
                    object: op.object.clone(),
                    old_version: op.old_version,
                    at_version: op.at_version,
                    txn: op.txn.clone(),
                    ack_wanted: true,
                }),
            });
        }
        effects.push(Effect::SubmitStorage {
            tid: op.tid,
            txn: op.txn.clone(),
        });
        self.active_for_object.insert(op.object.clone(), op.tid);
        self.ops.insert(op.tid, op);
    }

    /// Sends whatever responses the wait sets now permit, then retires
    /// the record once both sets are empty and the commit is out.
    fn maybe_complete(&mut self, tid: TxnId, metrics: &MetricsRegistry, effects: &mut Vec<Effect>) {
        let op = match self.ops.get_mut(&tid) {
            Some(op) => op,
            None => return,
        };
        if op.applied && op.can_send_ack() {
            effects.push(Effect::Respond(ClientResponse::ack(
                op.request,
                op.tid,
                op.at_version,
            )));
            op.sent_ack = true;
        }
        if op.applied && op.can_send_commit() {
            effects.push(Effect::Respond(ClientResponse::commit(
                op.request,
                op.tid,
                op.at_version,
            )));
            op.sent_commit = true;
        }
        if op.sent_commit && op.can_delete() {
            if let Some(op) = self.ops.remove(&tid) {
                if op.is_degraded() {
                    metrics.increment_degraded_completions();
                }
                self.unlink(&op, effects);
            }
        }
    }

    /// Terminal failure for `tid`: one error response, then the next
    /// parked write on the object is issued.
    fn fail(&mut self, tid: TxnId, reason: &str, effects: &mut Vec<Effect>) {
        let op = match self.ops.remove(&tid) {
            Some(op) => op,
            None => return,
        };
        effects.push(Effect::Respond(ClientResponse::error(
            op.request,
            Some(tid),
            reason,
        )));
        self.unlink(&op, effects);
    }

    /// Drops the per-object markers for a retired write and issues its
    /// successor, re-parking any further writes behind that successor.
    fn unlink(&mut self, op: &WriteOperation, effects: &mut Vec<Effect>) {
        if self.active_for_object.get(&op.object) == Some(&op.tid) {
            self.active_for_object.remove(&op.object);
        }
        if self.newest_for_object.get(&op.object) == Some(&op.tid) {
            self.newest_for_object.remove(&op.object);
        }
        let mut released = self.pending.release(op.tid);
        if let Some(next) = released.pop_front() {
            let next_tid = next.tid;
            for parked in released {
                self.pending.defer(next_tid, parked);
            }
            self.activate(next, effects);
        }
    }
}
