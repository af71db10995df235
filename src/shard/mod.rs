//! Shard façade
//!
//! Per SHARD_MODEL.md §1, one [`Shard`] owns everything about one shard of
//! the object store on one node: the write pipeline, the replica-side
//! sub-operation handling, the recovery engine, the read gate, and the
//! snapshot registry. The host drives it through four entry points
//! (client writes, peer messages, storage completions, membership
//! changes) plus the recovery pump, and drains the effect queue between
//! calls. Everything inside is single-threaded.

mod config;
mod errors;

pub use config::{ShardConfig, DEFAULT_MAX_RECOVERY_OPS};
pub use errors::{ShardError, ShardResult};

use crate::membership::{MissingInfo, ShardMembership};
use crate::messages::{
    ClientReply, ClientResponse, Effect, PeerMessage, RequestId, WriteRequest,
};
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::observability::{Event, Logger, MetricsRegistry, MetricsSnapshot};
use crate::reads::{ReadAdmission, ReadGate};
use crate::recovery::{RecoveryEngine, RecoveryError};
use crate::snapshots::{prepare_clone, SnapshotRegistry};
use crate::storage::{ApplyResult, Transaction};
use crate::version::Version;
use crate::write::{SubOpTracker, WriteAdmission, WriteCoordinator, WriteError, WriteOperation};

/// How the shard admitted a client write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Issued to replicas and local storage.
    Issued(TxnId),
    /// Accepted, parked behind an earlier write on the same object.
    Deferred(TxnId),
    /// Parked until the object is recovered locally; re-admitted
    /// automatically when the pull completes.
    AwaitingRecovery,
}

/// One shard of the object store on one node.
#[derive(Debug)]
pub struct Shard {
    config: ShardConfig,
    membership: ShardMembership,
    missing: MissingInfo,
    coordinator: WriteCoordinator,
    subops: SubOpTracker,
    recovery: RecoveryEngine,
    reads: ReadGate,
    snaps: SnapshotRegistry,
    metrics: MetricsRegistry,
    effects: Vec<Effect>,
}

impl Shard {
    /// Creates a shard at the given membership state.
    pub fn new(
        config: ShardConfig,
        membership: ShardMembership,
        missing: MissingInfo,
    ) -> ShardResult<Self> {
        config.validate()?;
        let replica = config.replica;
        Ok(Self {
            config,
            coordinator: WriteCoordinator::new(replica, membership.epoch()),
            subops: SubOpTracker::new(replica),
            recovery: RecoveryEngine::new(replica),
            reads: ReadGate::new(),
            snaps: SnapshotRegistry::new(),
            metrics: MetricsRegistry::new(),
            effects: Vec::new(),
            membership,
            missing,
        })
    }

    /// Accepts a client write.
    ///
    /// Admission order: snapshot-context validation, missing-object check
    /// (a write to a missing object parks until recovery), stale-version
    /// check, then transaction build and issue. The error return carries
    /// rejections the caller reports synchronously; everything after
    /// acceptance arrives through effects.
    pub fn submit_write(&mut self, request: WriteRequest) -> ShardResult<Admission> {
        if !request.snapc.is_valid() {
            return Err(WriteError::InvalidSnapContext.into());
        }
        let head = ObjectId::head(&request.object);

        if self.missing.own().is_missing(&head) {
            self.metrics.increment_writes_deferred();
            let object = head.to_string();
            Logger::info(Event::WriteAwaitingRecovery.as_str(), &[("object", &object)]);
            self.recovery.wait_for_missing(head, request);
            return Ok(Admission::AwaitingRecovery);
        }

        if let Err(err) = self.coordinator.check_version(&head, request.old_version) {
            self.metrics.increment_writes_stale_rejected();
            let object = head.to_string();
            let reason = err.to_string();
            Logger::info(
                Event::WriteStaleRejected.as_str(),
                &[("object", &object), ("reason", &reason)],
            );
            return Err(err.into());
        }

        // The clone, when one is due, rides in the same transaction as the
        // write so replicas apply both atomically.
        let mut txn = Transaction::new();
        let membership = self.snaps.get_or_default(&head);
        prepare_clone(&mut txn, membership, &head, &request.snapc);
        txn.write(head.clone(), request.offset, request.data.clone());
        membership.note_head_write(request.offset, request.data.len() as u64);
        let membership_at_write = membership.clone();

        let (admission, effects) = self.coordinator.begin_write(
            request.id,
            head.clone(),
            txn,
            request.old_version,
            membership_at_write,
            request.snapc.clone(),
            self.membership.peers().clone(),
        )?;

        self.metrics.increment_writes_accepted();
        let tid = admission.tid().to_string();
        let object = head.to_string();
        let fields = [("object", object.as_str()), ("tid", tid.as_str())];
        let admission = match admission {
            WriteAdmission::Issued(tid) => {
                Logger::info(Event::WriteAccepted.as_str(), &fields);
                Admission::Issued(tid)
            }
            WriteAdmission::Deferred(tid) => {
                self.metrics.increment_writes_deferred();
                Logger::info(Event::WriteDeferred.as_str(), &fields);
                Admission::Deferred(tid)
            }
        };
        self.emit(effects);
        Ok(admission)
    }

    /// Handles one peer message. Demultiplexing happens exactly once,
    /// here.
    pub fn handle_peer_message(&mut self, message: PeerMessage) {
        match message {
            PeerMessage::Replicate(msg) => {
                let tid = msg.tid.to_string();
                let from = msg.from.to_string();
                Logger::trace(
                    Event::SubOpReceived.as_str(),
                    &[("from", &from), ("tid", &tid)],
                );
                let effects = self.subops.on_replicate(msg);
                self.emit(effects);
            }
            PeerMessage::Ack { tid, from } => {
                let effects = self.coordinator.on_replica_ack(tid, from, &self.metrics);
                self.emit(effects);
            }
            PeerMessage::Commit {
                tid,
                from,
                complete_thru,
            } => {
                let effects =
                    self.coordinator
                        .on_replica_commit(tid, from, complete_thru, &self.metrics);
                self.emit(effects);
            }
            PeerMessage::Pull { from, plan } => {
                // Serving side of a pull: the host reads the planned
                // ranges and pushes them back. A pull repeated while
                // that push is in flight is dropped.
                let effects = self.recovery.serve_pull(from, plan);
                self.emit(effects);
            }
            PeerMessage::Push(msg) => {
                let effects = self.recovery.handle_push(msg, &self.metrics);
                self.emit(effects);
            }
            PeerMessage::PushReply { object, from } => {
                if self.recovery.on_push_reply(&object, from) {
                    self.missing.peer_mut(from).got(&object);
                    let obj = object.to_string();
                    let peer = from.to_string();
                    Logger::info(
                        Event::PushCompleted.as_str(),
                        &[("object", &obj), ("to", &peer)],
                    );
                }
            }
        }
    }

    /// Storage completion for `tid`. Routed to whichever subsystem
    /// submitted the transaction; completions for transactions nobody
    /// tracks (cancelled installs, retired writes) are dropped.
    pub fn on_local_apply(&mut self, tid: TxnId, result: ApplyResult) {
        let applied = result.is_applied();
        if self.coordinator.owns(tid) {
            if applied {
                let t = tid.to_string();
                Logger::info(Event::WriteApplied.as_str(), &[("tid", &t)]);
            }
            let effects = self.coordinator.on_local_apply(tid, result, &self.metrics);
            self.emit(effects);
        } else if self.subops.owns(tid) {
            if applied {
                let t = tid.to_string();
                Logger::trace(Event::SubOpApplied.as_str(), &[("tid", &t)]);
            }
            let effects = self.subops.on_local_apply(tid, result);
            self.emit(effects);
        } else if let Some((effects, released)) =
            self.recovery
                .on_local_apply(tid, result, &mut self.missing, &mut self.snaps)
        {
            if applied {
                self.metrics.increment_objects_recovered();
                let t = tid.to_string();
                Logger::info(Event::PullCompleted.as_str(), &[("tid", &t)]);
            }
            self.emit(effects);
            for request in released {
                self.resubmit(request);
            }
        } else {
            let t = tid.to_string();
            Logger::warn(Event::UnknownCompletion.as_str(), &[("tid", &t)]);
        }
    }

    /// A replica was reported failed by the external failure detector.
    /// Every in-flight and parked write stops waiting on it; writes only
    /// waiting on it complete degraded.
    pub fn on_replica_failure(&mut self, replica: ReplicaId) {
        self.metrics.increment_replica_failures();
        let r = replica.to_string();
        Logger::warn(Event::ReplicaFailed.as_str(), &[("replica", &r)]);
        let effects = self.coordinator.on_replica_failure(replica, &self.metrics);
        self.emit(effects);
    }

    /// Installs a new membership view from the external authority.
    ///
    /// Ejected peers are treated as failed, all recovery state is
    /// cancelled (writes parked on it get errors and must re-request),
    /// and the version space moves to the new epoch.
    pub fn on_membership_change(&mut self, membership: ShardMembership, missing: MissingInfo) {
        for replica in self.membership.ejected_peers(&membership) {
            self.on_replica_failure(replica);
        }

        let (waiters, cancelled) = self.recovery.cancel_all();
        if cancelled > 0 || !waiters.is_empty() {
            self.metrics.increment_recovery_cancellations();
            let n = cancelled.to_string();
            Logger::info(Event::RecoveryCancelled.as_str(), &[("cancelled", &n)]);
        }
        let reason = RecoveryError::Aborted.to_string();
        let responses: Vec<Effect> = waiters
            .into_iter()
            .map(|req| Effect::Respond(ClientResponse::error(req.id, None, reason.clone())))
            .collect();
        self.emit(responses);

        self.coordinator.advance_epoch(membership.epoch());
        let epoch = membership.epoch().to_string();
        Logger::info(Event::MembershipChanged.as_str(), &[("epoch", &epoch)]);
        self.membership = membership;
        self.missing = missing;
    }

    /// Starts up to the configured budget of recovery operations:
    /// write-blocking pulls first, then background pulls, then pushes.
    /// Returns how many were started.
    pub fn drive_recovery(&mut self) -> usize {
        let (started, effects) = self.recovery.recover_next(
            self.config.max_recovery_ops,
            &self.missing,
            &self.membership,
            &self.snaps,
        );
        self.emit(effects);
        started
    }

    /// Marks `object` eligible for balanced reads. Disabled by
    /// configuration or mid-drain, this is a no-op returning false.
    pub fn enable_read_balancing(&mut self, object: ObjectId) -> bool {
        if !self.config.read_balancing {
            return false;
        }
        let obj = object.to_string();
        let changed = self.reads.enable_balancing(object);
        if changed {
            Logger::info(Event::ReadBalanceEnabled.as_str(), &[("object", &obj)]);
        }
        changed
    }

    /// Begins draining `object` out of the balanced set. Reads arriving
    /// during the drain queue until [`Self::settle_read_balancing`].
    pub fn disable_read_balancing(&mut self, object: ObjectId) -> bool {
        let obj = object.to_string();
        let changed = self.reads.disable_balancing(object);
        if changed {
            Logger::info(Event::ReadBalanceDraining.as_str(), &[("object", &obj)]);
        }
        changed
    }

    /// Completes `object`'s drain and replays queued reads in order.
    pub fn settle_read_balancing(&mut self, object: &ObjectId) -> bool {
        match self.reads.settle(object) {
            Some(effects) => {
                let obj = object.to_string();
                let queued = effects.len().to_string();
                Logger::info(
                    Event::ReadBalanceSettled.as_str(),
                    &[("object", &obj), ("replayed", &queued)],
                );
                self.emit(effects);
                true
            }
            None => false,
        }
    }

    /// Admits a read against the gate.
    pub fn admit_read(&mut self, object: &ObjectId, request: RequestId) -> ReadAdmission {
        self.reads.admit_read(object, request)
    }

    /// True if replicas may serve reads of `object` right now.
    pub fn is_read_balanced(&self, object: &ObjectId) -> bool {
        self.reads.is_read_balanced(object)
    }

    /// Drains the accumulated effects for the host to perform, in
    /// emission order.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Point-in-time metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn membership(&self) -> &ShardMembership {
        &self.membership
    }

    pub fn missing(&self) -> &MissingInfo {
        &self.missing
    }

    /// The in-flight write for `tid`, if live.
    pub fn write_op(&self, tid: TxnId) -> Option<&WriteOperation> {
        self.coordinator.op(tid)
    }

    /// The write pipeline, read-only.
    pub fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    /// The recovery engine, read-only.
    pub fn recovery(&self) -> &RecoveryEngine {
        &self.recovery
    }

    /// The version through which every participant of every in-flight
    /// write is known stable; bounds host-side log trimming.
    pub fn min_complete_thru(&self) -> Option<Version> {
        self.coordinator.min_complete_thru()
    }

    /// Re-admits a write released by recovery. A rejection at this point
    /// (the version moved while the write waited) becomes an error
    /// response: the client already handed the request over.
    fn resubmit(&mut self, request: WriteRequest) {
        let id = request.id;
        if let Err(err) = self.submit_write(request) {
            self.emit(vec![Effect::Respond(ClientResponse::error(
                id,
                None,
                err.to_string(),
            ))]);
        }
    }

    /// Appends effects to the outbound queue, counting and logging the
    /// externally meaningful ones at this single choke point.
    fn emit(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match &effect {
                Effect::Respond(response) => match &response.reply {
                    ClientReply::Ack { .. } => {
                        self.metrics.increment_acks_sent();
                        let req = response.request.to_string();
                        Logger::info(Event::AckSent.as_str(), &[("request", &req)]);
                    }
                    ClientReply::Commit { .. } => {
                        self.metrics.increment_commits_sent();
                        let req = response.request.to_string();
                        Logger::info(Event::CommitSent.as_str(), &[("request", &req)]);
                    }
                    ClientReply::Error { reason } => {
                        self.metrics.increment_writes_failed();
                        let req = response.request.to_string();
                        Logger::warn(
                            Event::WriteFailed.as_str(),
                            &[("reason", reason), ("request", &req)],
                        );
                    }
                },
                Effect::SendPeer {
                    message: PeerMessage::Pull { plan, .. },
                    ..
                } => {
                    self.metrics.increment_pulls_started();
                    let obj = plan.object.to_string();
                    Logger::info(Event::PullStarted.as_str(), &[("object", &obj)]);
                }
                Effect::SendPush { to, plan } => {
                    self.metrics.increment_pushes_started();
                    let obj = plan.object.to_string();
                    let dest = to.to_string();
                    Logger::info(
                        Event::PushStarted.as_str(),
                        &[("object", &obj), ("to", &dest)],
                    );
                }
                _ => {}
            }
            self.effects.push(effect);
        }
    }
}
