//! Object recovery engine
//!
//! Per RECOVERY_ENGINE.md, recovery moves missing objects between
//! replicas one object at a time:
//! - *pull*: this node is missing the object and asks a source for the
//!   byte-range subsets it lacks
//! - *push*: a peer is missing the object and this node sends the subsets
//!
//! Objects blocking an in-flight write are recovered before background
//! backfill. All recovery state is cleared on membership change; writes
//! parked on recovery are surfaced to the caller for error responses.
//!
//! Install transactions are keyed in a tid namespace disjoint from write
//! tids so storage completions route unambiguously.

use super::errors::{RecoveryError, RecoveryResult};
use crate::membership::{MissingInfo, MissingSet, ShardMembership};
use crate::messages::{Effect, PeerMessage, PushMessage, TransferPlan, WriteRequest};
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::snapshots::{
    attribute_sources, compute_clone_subset, compute_head_subset, SnapshotMembership,
    SnapshotRegistry,
};
use crate::storage::{ApplyResult, Transaction};
use crate::version::Version;
use std::collections::{BTreeMap, BTreeSet};

/// Install tids live above this base; write tids are allocated from 1.
const INSTALL_TID_BASE: u64 = 1 << 62;

/// One in-flight pull.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryCursor {
    /// Object being pulled.
    pub object: ObjectId,
    /// Version the pull brings the object to.
    pub version: Version,
    /// Peer serving the pull.
    pub source: ReplicaId,
}

/// How a pull request was admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    /// A pull was started.
    Started,
    /// The object is already fully present; nothing to do.
    AlreadyPresent,
}

/// A push payload handed to storage, awaiting the apply completion.
#[derive(Debug)]
struct PendingInstall {
    object: ObjectId,
    /// The sender of the push; gets the `PushReply` once durable.
    reply_to: ReplicaId,
    /// Installed into the registry only once the data is durable.
    membership: SnapshotMembership,
}

/// Per-shard recovery state machine.
#[derive(Debug)]
pub struct RecoveryEngine {
    self_id: ReplicaId,
    /// In-flight pulls, one cursor per object.
    pulling: BTreeMap<ObjectId, RecoveryCursor>,
    /// In-flight pushes: object to the set of destinations.
    pushing: BTreeMap<ObjectId, BTreeSet<ReplicaId>>,
    /// Writes parked until their object is recovered locally.
    waiting_for_missing: BTreeMap<ObjectId, Vec<WriteRequest>>,
    /// Push payloads handed to storage, by install tid.
    installs: BTreeMap<TxnId, PendingInstall>,
    next_install: u64,
}

impl RecoveryEngine {
    pub fn new(self_id: ReplicaId) -> Self {
        Self {
            self_id,
            pulling: BTreeMap::new(),
            pushing: BTreeMap::new(),
            waiting_for_missing: BTreeMap::new(),
            installs: BTreeMap::new(),
            next_install: 0,
        }
    }

    /// True if a pull for `object` is in flight.
    pub fn is_pulling(&self, object: &ObjectId) -> bool {
        self.pulling.contains_key(object)
    }

    /// The pull cursor for `object`, if one is in flight.
    pub fn cursor(&self, object: &ObjectId) -> Option<&RecoveryCursor> {
        self.pulling.get(object)
    }

    /// Destinations a push of `object` is in flight to.
    pub fn pushing_to(&self, object: &ObjectId) -> Option<&BTreeSet<ReplicaId>> {
        self.pushing.get(object)
    }

    /// True if `tid` names an install awaiting its storage completion.
    pub fn owns(&self, tid: TxnId) -> bool {
        self.installs.contains_key(&tid)
    }

    /// Writes currently parked on recovery.
    pub fn waiting_count(&self) -> usize {
        self.waiting_for_missing.values().map(Vec::len).sum()
    }

    /// Parks a write until `object` is recovered locally. Parked writes
    /// make the object write-blocking for prioritization.
    pub fn wait_for_missing(&mut self, object: ObjectId, request: WriteRequest) {
        self.waiting_for_missing.entry(object).or_default().push(request);
    }

    /// Starts a pull for `object`.
    ///
    /// An object already fully present is a no-op success. A second pull
    /// for an object already being pulled is rejected.
    pub fn pull(
        &mut self,
        object: ObjectId,
        missing: &MissingInfo,
        membership: &ShardMembership,
        snaps: &SnapshotRegistry,
    ) -> RecoveryResult<(PullOutcome, Vec<Effect>)> {
        if self.pulling.contains_key(&object) {
            return Err(RecoveryError::AlreadyInFlight(object));
        }
        let version = match missing.own().need_version(&object) {
            Some(v) => v,
            None => return Ok((PullOutcome::AlreadyPresent, Vec::new())),
        };
        let source = missing
            .pull_source(&object, membership)
            .ok_or_else(|| RecoveryError::NoSource(object.clone()))?;

        let plan = build_plan(&object, version, snaps, missing.own());
        self.pulling.insert(
            object.clone(),
            RecoveryCursor {
                object,
                version,
                source,
            },
        );
        Ok((
            PullOutcome::Started,
            vec![Effect::SendPeer {
                to: source,
                message: PeerMessage::Pull {
                    from: self.self_id,
                    plan,
                },
            }],
        ))
    }

    /// Starts a push of `object` toward `to`, covering exactly what that
    /// peer is missing. A peer not missing the object, or one already
    /// being pushed to, is a no-op.
    pub fn push_to_replica(
        &mut self,
        object: ObjectId,
        to: ReplicaId,
        missing: &MissingInfo,
        snaps: &SnapshotRegistry,
    ) -> Vec<Effect> {
        let peer_missing = match missing.peer(to) {
            Some(m) if m.is_missing(&object) => m,
            _ => return Vec::new(),
        };
        if self
            .pushing
            .get(&object)
            .map(|dests| dests.contains(&to))
            .unwrap_or(false)
        {
            return Vec::new();
        }
        let version = peer_missing
            .need_version(&object)
            .unwrap_or(Version::ZERO);
        let plan = build_plan(&object, version, snaps, peer_missing);
        self.pushing.entry(object).or_default().insert(to);
        vec![Effect::SendPush { to, plan }]
    }

    /// Starts up to `budget` recovery operations: pulls for objects
    /// blocking a write first, then the rest of the local missing set,
    /// then pushes for peers' missing objects. Returns how many started.
    pub fn recover_next(
        &mut self,
        budget: usize,
        missing: &MissingInfo,
        membership: &ShardMembership,
        snaps: &SnapshotRegistry,
    ) -> (usize, Vec<Effect>) {
        let mut started = 0;
        let mut effects = Vec::new();

        let blocked: Vec<ObjectId> = self.waiting_for_missing.keys().cloned().collect();
        let background: Vec<ObjectId> = missing
            .own()
            .iter()
            .map(|(o, _)| o.clone())
            .filter(|o| !self.waiting_for_missing.contains_key(o))
            .collect();

        for object in blocked.into_iter().chain(background) {
            if started >= budget {
                return (started, effects);
            }
            if self.pulling.contains_key(&object) || !missing.own().is_missing(&object) {
                continue;
            }
            match self.pull(object, missing, membership, snaps) {
                Ok((PullOutcome::Started, fx)) => {
                    effects.extend(fx);
                    started += 1;
                }
                Ok((PullOutcome::AlreadyPresent, _)) => {}
                Err(RecoveryError::NoSource(object)) => {
                    let obj = object.to_string();
                    Logger::warn(Event::PullSourceUnavailable.as_str(), &[("object", &obj)]);
                }
                Err(_) => {}
            }
        }

        for &replica in membership.peers() {
            let peer_objects: Vec<ObjectId> = match missing.peer(replica) {
                Some(m) => m.iter().map(|(o, _)| o.clone()).collect(),
                None => continue,
            };
            for object in peer_objects {
                if started >= budget {
                    return (started, effects);
                }
                // This node cannot serve what it lacks itself.
                if missing.own().is_missing(&object) {
                    continue;
                }
                let fx = self.push_to_replica(object, replica, missing, snaps);
                if !fx.is_empty() {
                    effects.extend(fx);
                    started += 1;
                }
            }
        }

        (started, effects)
    }

    /// Serves a peer's pull request: registers the destination as a push
    /// target and hands the host the plan to read and push back. A pull
    /// repeated while that push is still in flight is dropped.
    pub fn serve_pull(&mut self, from: ReplicaId, plan: TransferPlan) -> Vec<Effect> {
        let dests = self.pushing.entry(plan.object.clone()).or_default();
        if !dests.insert(from) {
            return Vec::new();
        }
        vec![Effect::SendPush { to: from, plan }]
    }

    /// Receives pushed object data (as the puller, or as the target of a
    /// primary's push). A payload failing verification is discarded with
    /// no state change; the source will re-push on a later drive. The
    /// pushed membership takes effect only once the install is durable.
    pub fn handle_push(&mut self, msg: PushMessage, metrics: &MetricsRegistry) -> Vec<Effect> {
        if !msg.verify_payload() {
            metrics.increment_pushes_rejected();
            let from = msg.from.to_string();
            let object = msg.plan.object.to_string();
            Logger::warn(
                Event::PushRejected.as_str(),
                &[("from", &from), ("object", &object)],
            );
            return Vec::new();
        }

        let txn = build_install_txn(&msg);

        self.next_install += 1;
        let tid = TxnId::new(INSTALL_TID_BASE + self.next_install);
        self.installs.insert(
            tid,
            PendingInstall {
                object: msg.plan.object.clone(),
                reply_to: msg.from,
                membership: msg.plan.membership,
            },
        );
        vec![Effect::SubmitStorage { tid, txn }]
    }

    /// Storage completion for an install. Returns `None` if `tid` is not
    /// an install tid. On success the object is marked recovered, the
    /// pushed membership lands in the registry, the source gets its
    /// `PushReply`, and writes parked on the object are handed back for
    /// re-admission. On failure the registry is untouched: it must never
    /// describe data storage does not hold.
    pub fn on_local_apply(
        &mut self,
        tid: TxnId,
        result: ApplyResult,
        missing: &mut MissingInfo,
        snaps: &mut SnapshotRegistry,
    ) -> Option<(Vec<Effect>, Vec<WriteRequest>)> {
        let install = self.installs.remove(&tid)?;
        match result {
            ApplyResult::Applied => {
                self.pulling.remove(&install.object);
                missing.own_mut().got(&install.object);
                snaps.install(install.object.name(), install.membership);
                let released = self
                    .waiting_for_missing
                    .remove(&install.object)
                    .unwrap_or_default();
                let effects = vec![Effect::SendPeer {
                    to: install.reply_to,
                    message: PeerMessage::PushReply {
                        object: install.object,
                        from: self.self_id,
                    },
                }];
                Some((effects, released))
            }
            ApplyResult::Failed { reason } => {
                // Drop the cursor so the next drive retries the pull.
                self.pulling.remove(&install.object);
                let object = install.object.to_string();
                Logger::error(
                    Event::InstallFailed.as_str(),
                    &[("object", &object), ("reason", &reason)],
                );
                Some((Vec::new(), Vec::new()))
            }
        }
    }

    /// A destination confirmed an earlier push durable. Returns true if
    /// the push was in flight.
    pub fn on_push_reply(&mut self, object: &ObjectId, from: ReplicaId) -> bool {
        if let Some(dests) = self.pushing.get_mut(object) {
            let removed = dests.remove(&from);
            if dests.is_empty() {
                self.pushing.remove(object);
            }
            removed
        } else {
            false
        }
    }

    /// Clears every pull, push, and pending install. Returns the writes
    /// that were parked on recovery (they must be failed back to their
    /// clients) and the number of operations cancelled.
    ///
    /// A storage completion for a cancelled install arrives later and is
    /// dropped as unknown.
    pub fn cancel_all(&mut self) -> (Vec<WriteRequest>, usize) {
        let cancelled = self.pulling.len()
            + self.pushing.values().map(BTreeSet::len).sum::<usize>()
            + self.installs.len();
        self.pulling.clear();
        self.pushing.clear();
        self.installs.clear();
        let waiters = std::mem::take(&mut self.waiting_for_missing)
            .into_values()
            .flatten()
            .collect();
        (waiters, cancelled)
    }
}

/// Plans the transfer of `object` toward a destination with the given
/// missing set: subset computation for heads and clones, plus the
/// membership the destination installs alongside the data.
fn build_plan(
    object: &ObjectId,
    version: Version,
    snaps: &SnapshotRegistry,
    dest_missing: &MissingSet,
) -> TransferPlan {
    let membership = snaps
        .get(&object.head_id())
        .cloned()
        .unwrap_or_default();
    let subset = if object.is_head() {
        compute_head_subset(&membership, dest_missing, object)
    } else {
        compute_clone_subset(&membership, object, dest_missing)
    };
    TransferPlan {
        object: object.clone(),
        version,
        data_subset: subset.data_subset,
        clone_subsets: subset.clone_subsets,
        membership,
    }
}

/// Builds the transaction installing a verified push.
///
/// Clone-subset bytes land first. Untransmitted ranges of the recovered
/// object are then cloned from their owning clones, per the same
/// attribution walk the planner ran: an owner either had its bytes
/// written earlier in this transaction, or the planner omitted it
/// because the destination already holds it. The object's own bytes
/// overwrite last. The payload layout follows the plan: data subset
/// first, clone subsets in key order, every range ascending. Lengths
/// were verified upstream.
fn build_install_txn(msg: &PushMessage) -> Transaction {
    let mut cursor = 0usize;
    let mut take = |len: u64| -> Vec<u8> {
        let end = cursor + len as usize;
        let bytes = msg.payload[cursor..end].to_vec();
        cursor = end;
        bytes
    };

    let mut data_writes = Vec::new();
    for (start, len) in msg.plan.data_subset.iter() {
        data_writes.push((start, take(len)));
    }
    let mut clone_writes = Vec::new();
    for (clone_id, ranges) in &msg.plan.clone_subsets {
        for (start, len) in ranges.iter() {
            clone_writes.push((clone_id.clone(), start, take(len)));
        }
    }

    let mut txn = Transaction::new();
    for (clone_id, start, bytes) in clone_writes {
        txn.write(clone_id, start, bytes);
    }
    for clone_id in msg.plan.clone_subsets.keys() {
        if let Some(info) = clone_id.snap().and_then(|s| msg.plan.membership.clone_info(s)) {
            txn.set_snaps(clone_id.clone(), info.snaps.clone());
        }
    }
    let attribution = attribute_sources(&msg.plan.membership, &msg.plan.object);
    for (src, ranges) in attribution.clone_sources {
        txn.clone_range(src, msg.plan.object.clone(), ranges);
    }
    for (start, bytes) in data_writes {
        txn.write(msg.plan.object.clone(), start, bytes);
    }
    txn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{IntervalSet, SnapId};
    use crate::snapshots::SnapContext;
    use crate::storage::TransactionOp;
    use uuid::Uuid;

    fn membership(primary: u32, peers: &[u32]) -> ShardMembership {
        ShardMembership::new(
            1,
            ReplicaId::new(primary),
            peers.iter().map(|&r| ReplicaId::new(r)).collect(),
        )
    }

    /// Snapshot history used by the install tests: extent 0..100, clones
    /// s1 (delta = full extent), s2 (delta [10,30)), s3 (delta [20,40)),
    /// head at the s3 state.
    fn three_clone_membership() -> SnapshotMembership {
        let mut m = SnapshotMembership::new();
        m.note_head_write(0, 100);
        m.freeze_head(SnapId::new(1), vec![SnapId::new(1)]);
        m.note_head_write(10, 20);
        m.freeze_head(SnapId::new(2), vec![SnapId::new(2)]);
        m.note_head_write(20, 20);
        m.freeze_head(SnapId::new(3), vec![SnapId::new(3)]);
        m
    }

    fn write_request(object: &str) -> WriteRequest {
        WriteRequest {
            id: Uuid::new_v4(),
            object: object.to_string(),
            offset: 0,
            data: vec![1, 2, 3],
            old_version: Version::ZERO,
            snapc: SnapContext::empty(),
        }
    }

    fn engine() -> (RecoveryEngine, SnapshotRegistry, MetricsRegistry) {
        (
            RecoveryEngine::new(ReplicaId::new(0)),
            SnapshotRegistry::new(),
            MetricsRegistry::new(),
        )
    }

    #[test]
    fn test_pull_targets_lowest_usable_source() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1, 2]);
        let obj = ObjectId::head("o");

        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 4));
        missing.peer_mut(ReplicaId::new(1)).add(obj.clone(), Version::new(1, 4));

        let (outcome, effects) = e.pull(obj.clone(), &missing, &m, &snaps).unwrap();
        assert_eq!(outcome, PullOutcome::Started);
        assert!(matches!(
            &effects[..],
            [Effect::SendPeer {
                to,
                message: PeerMessage::Pull { .. }
            }] if *to == ReplicaId::new(2)
        ));
        assert_eq!(e.cursor(&obj).unwrap().version, Version::new(1, 4));
    }

    #[test]
    fn test_double_pull_rejected() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let obj = ObjectId::head("o");
        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 1));

        e.pull(obj.clone(), &missing, &m, &snaps).unwrap();
        let err = e.pull(obj.clone(), &missing, &m, &snaps).unwrap_err();
        assert!(matches!(err, RecoveryError::AlreadyInFlight(_)));
    }

    #[test]
    fn test_pull_of_present_object_is_noop_success() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let (outcome, effects) = e
            .pull(ObjectId::head("o"), &MissingInfo::default(), &m, &snaps)
            .unwrap();
        assert_eq!(outcome, PullOutcome::AlreadyPresent);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_pull_without_source_errors() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let obj = ObjectId::head("o");
        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 1));
        missing.peer_mut(ReplicaId::new(1)).add(obj.clone(), Version::new(1, 1));

        assert!(matches!(
            e.pull(obj, &missing, &m, &snaps).unwrap_err(),
            RecoveryError::NoSource(_)
        ));
    }

    #[test]
    fn test_push_install_reply_round_trip() {
        let (mut e, mut snaps, metrics) = engine();
        let obj = ObjectId::head("o");
        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 2));

        let plan = TransferPlan {
            object: obj.clone(),
            version: Version::new(1, 2),
            data_subset: IntervalSet::from_range(0, 4),
            clone_subsets: BTreeMap::new(),
            membership: Default::default(),
        };
        let msg = PushMessage::assemble(ReplicaId::new(2), plan, vec![9u8; 4]);

        let effects = e.handle_push(msg, &metrics);
        let tid = match &effects[..] {
            [Effect::SubmitStorage { tid, txn }] => {
                assert_eq!(txn.len(), 1);
                *tid
            }
            other => panic!("expected one storage submit, got {:?}", other),
        };
        assert!(e.owns(tid));

        e.wait_for_missing(obj.clone(), write_request("o"));
        let (effects, released) = e
            .on_local_apply(tid, ApplyResult::Applied, &mut missing, &mut snaps)
            .expect("install tid");
        assert!(matches!(
            &effects[..],
            [Effect::SendPeer {
                to,
                message: PeerMessage::PushReply { .. }
            }] if *to == ReplicaId::new(2)
        ));
        assert_eq!(released.len(), 1);
        assert!(!missing.own().is_missing(&obj));
    }

    #[test]
    fn test_corrupt_push_discarded() {
        let (mut e, _snaps, metrics) = engine();
        let plan = TransferPlan {
            object: ObjectId::head("o"),
            version: Version::new(1, 1),
            data_subset: IntervalSet::from_range(0, 4),
            clone_subsets: BTreeMap::new(),
            membership: Default::default(),
        };
        let mut msg = PushMessage::assemble(ReplicaId::new(2), plan, vec![9u8; 4]);
        msg.payload[0] ^= 0xFF;

        assert!(e.handle_push(msg, &metrics).is_empty());
        assert_eq!(metrics.snapshot().pushes_rejected, 1);
    }

    #[test]
    fn test_recover_next_prioritizes_write_blocking_objects() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let blocked = ObjectId::head("b");
        let background = ObjectId::head("a");

        let mut missing = MissingInfo::default();
        missing.own_mut().add(background.clone(), Version::new(1, 1));
        missing.own_mut().add(blocked.clone(), Version::new(1, 2));
        e.wait_for_missing(blocked.clone(), write_request("b"));

        // Budget of one: the write-blocking object wins despite sorting
        // after the background one.
        let (started, _) = e.recover_next(1, &missing, &m, &snaps);
        assert_eq!(started, 1);
        assert!(e.is_pulling(&blocked));
        assert!(!e.is_pulling(&background));
    }

    #[test]
    fn test_recover_next_pushes_to_missing_peers() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1, 2]);
        let obj = ObjectId::head("o");

        let mut missing = MissingInfo::default();
        missing.peer_mut(ReplicaId::new(2)).add(obj.clone(), Version::new(1, 3));

        let (started, effects) = e.recover_next(4, &missing, &m, &snaps);
        assert_eq!(started, 1);
        assert!(matches!(
            &effects[..],
            [Effect::SendPush { to, .. }] if *to == ReplicaId::new(2)
        ));
        assert!(e.pushing_to(&obj).unwrap().contains(&ReplicaId::new(2)));

        // The reply retires the push; a repeat drive starts nothing.
        assert!(e.on_push_reply(&obj, ReplicaId::new(2)));
        assert!(e.pushing_to(&obj).is_none());
    }

    #[test]
    fn test_recover_next_respects_budget() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let mut missing = MissingInfo::default();
        for name in ["a", "b", "c"] {
            missing.own_mut().add(ObjectId::head(name), Version::new(1, 1));
        }

        let (started, _) = e.recover_next(2, &missing, &m, &snaps);
        assert_eq!(started, 2);
    }

    #[test]
    fn test_cancel_all_returns_waiters() {
        let (mut e, snaps, _m) = engine();
        let m = membership(0, &[1]);
        let obj = ObjectId::head("o");
        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 1));

        e.pull(obj.clone(), &missing, &m, &snaps).unwrap();
        e.wait_for_missing(obj.clone(), write_request("o"));
        e.wait_for_missing(obj.clone(), write_request("o"));

        let (waiters, cancelled) = e.cancel_all();
        assert_eq!(waiters.len(), 2);
        assert_eq!(cancelled, 1);
        assert!(!e.is_pulling(&obj));
        assert_eq!(e.waiting_count(), 0);
    }

    #[test]
    fn test_install_txn_layout_with_clone_subsets() {
        let mut clone_subsets = BTreeMap::new();
        let clone_id = ObjectId::clone_at("o", crate::object::SnapId::new(2));
        clone_subsets.insert(clone_id.clone(), IntervalSet::from_range(10, 3));

        let plan = TransferPlan {
            object: ObjectId::head("o"),
            version: Version::new(1, 1),
            data_subset: IntervalSet::from_range(0, 4),
            clone_subsets,
            membership: Default::default(),
        };
        // Payload: 4 data bytes then 3 clone bytes.
        let msg = PushMessage::assemble(
            ReplicaId::new(1),
            plan,
            vec![1, 2, 3, 4, 5, 6, 7],
        );
        assert!(msg.verify_payload());

        let txn = build_install_txn(&msg);
        // Clone write first, head write last.
        match &txn.ops()[0] {
            crate::storage::TransactionOp::Write { object, offset, data } => {
                assert_eq!(object, &clone_id);
                assert_eq!(*offset, 10);
                assert_eq!(data, &vec![5, 6, 7]);
            }
            op => panic!("expected clone write, got {:?}", op),
        }
        match txn.ops().last().unwrap() {
            crate::storage::TransactionOp::Write { object, offset, data } => {
                assert!(object.is_head());
                assert_eq!(*offset, 0);
                assert_eq!(data, &vec![1, 2, 3, 4]);
            }
            op => panic!("expected head write, got {:?}", op),
        }
    }

    fn push_covering(plan: TransferPlan, from: u32) -> PushMessage {
        let len = plan.expected_payload_len() as usize;
        PushMessage::assemble(ReplicaId::new(from), plan, vec![0u8; len])
    }

    #[test]
    fn test_install_sources_untransmitted_ranges_from_owning_clones() {
        // Destination is missing the head, s1, and s2; s3 it holds. Every
        // untransmitted head range must be cloned from the clone that
        // owns it: s3 locally, s1 and s2 from the bytes this same
        // transaction writes into them.
        let m = three_clone_membership();
        let head = ObjectId::head("o");
        let s1 = ObjectId::clone_at("o", SnapId::new(1));
        let s2 = ObjectId::clone_at("o", SnapId::new(2));
        let s3 = ObjectId::clone_at("o", SnapId::new(3));

        let mut dest_missing = MissingSet::new();
        for o in [&head, &s1, &s2] {
            dest_missing.add(o.clone(), Version::new(1, 1));
        }
        let subsets = compute_head_subset(&m, &dest_missing, &head);
        let msg = push_covering(
            TransferPlan {
                object: head.clone(),
                version: Version::new(1, 1),
                data_subset: subsets.data_subset,
                clone_subsets: subsets.clone_subsets,
                membership: m,
            },
            1,
        );
        assert!(msg.verify_payload());

        let txn = build_install_txn(&msg);
        let mut written: BTreeMap<ObjectId, IntervalSet> = BTreeMap::new();
        let mut cloned: BTreeMap<ObjectId, IntervalSet> = BTreeMap::new();
        let mut head_backed = IntervalSet::new();
        for op in txn.ops() {
            match op {
                TransactionOp::Write { object, offset, data } => {
                    let len = data.len() as u64;
                    written.entry(object.clone()).or_default().insert(*offset, len);
                    if object.is_head() {
                        head_backed.insert(*offset, len);
                    }
                }
                TransactionOp::CloneRange { src, dst, ranges } => {
                    assert!(dst.is_head());
                    cloned.entry(src.clone()).or_default().union_with(ranges);
                    head_backed.union_with(ranges);
                }
                TransactionOp::SetSnaps { .. } => {}
            }
        }

        // Each owner contributes exactly its surviving delta.
        assert_eq!(cloned.get(&s3), Some(&IntervalSet::from_range(20, 20)));
        assert_eq!(cloned.get(&s2), Some(&IntervalSet::from_range(10, 10)));
        let mut s1_expected = IntervalSet::from_range(0, 10);
        s1_expected.insert(40, 60);
        assert_eq!(cloned.get(&s1), Some(&s1_expected));

        // Ranges cloned out of a clone this transaction installs are
        // backed by the bytes it writes there first.
        for (src, ranges) in &cloned {
            if *src != s3 {
                let backing = written.get(src).expect("install writes the source");
                assert!(backing.covers(ranges));
            }
        }

        // The head ends fully backed.
        assert!(head_backed.covers(&IntervalSet::from_range(0, 100)));
    }

    #[test]
    fn test_install_reconstructs_clone_from_older_present_clone() {
        // Recovering s2 alone: its plan carries only its own delta, and
        // the rest of its extent is cloned locally from s1, which the
        // destination holds.
        let m = three_clone_membership();
        let s1 = ObjectId::clone_at("o", SnapId::new(1));
        let s2 = ObjectId::clone_at("o", SnapId::new(2));

        let mut dest_missing = MissingSet::new();
        dest_missing.add(s2.clone(), Version::new(1, 1));
        let subsets = compute_clone_subset(&m, &s2, &dest_missing);
        assert!(subsets.clone_subsets.is_empty());

        let msg = push_covering(
            TransferPlan {
                object: s2.clone(),
                version: Version::new(1, 1),
                data_subset: subsets.data_subset,
                clone_subsets: subsets.clone_subsets,
                membership: m,
            },
            1,
        );
        let txn = build_install_txn(&msg);

        let (src, dst, ranges) = txn
            .ops()
            .iter()
            .find_map(|op| match op {
                TransactionOp::CloneRange { src, dst, ranges } => {
                    Some((src.clone(), dst.clone(), ranges.clone()))
                }
                _ => None,
            })
            .expect("a local clone-range op");
        assert_eq!(src, s1);
        assert_eq!(dst, s2);
        let mut expected = IntervalSet::from_range(0, 10);
        expected.insert(30, 70);
        assert_eq!(ranges, expected);
    }

    #[test]
    fn test_membership_installed_only_after_durable_apply() {
        let (mut e, mut snaps, metrics) = engine();
        let obj = ObjectId::head("o");
        let mut missing = MissingInfo::default();
        missing.own_mut().add(obj.clone(), Version::new(1, 1));

        let m = three_clone_membership();
        let plan = TransferPlan {
            object: obj.clone(),
            version: Version::new(1, 1),
            data_subset: IntervalSet::new(),
            clone_subsets: BTreeMap::new(),
            membership: m.clone(),
        };

        // A failed apply leaves the registry and missing set untouched.
        let effects = e.handle_push(push_covering(plan.clone(), 2), &metrics);
        let tid = match &effects[..] {
            [Effect::SubmitStorage { tid, .. }] => *tid,
            other => panic!("expected a storage submit, got {:?}", other),
        };
        assert!(snaps.get(&obj).is_none());
        e.on_local_apply(
            tid,
            ApplyResult::Failed {
                reason: "io error".to_string(),
            },
            &mut missing,
            &mut snaps,
        )
        .expect("install tid");
        assert!(snaps.get(&obj).is_none());
        assert!(missing.own().is_missing(&obj));

        // A successful retry lands data and membership together.
        let effects = e.handle_push(push_covering(plan, 2), &metrics);
        let tid = match &effects[..] {
            [Effect::SubmitStorage { tid, .. }] => *tid,
            other => panic!("expected a storage submit, got {:?}", other),
        };
        e.on_local_apply(tid, ApplyResult::Applied, &mut missing, &mut snaps)
            .expect("install tid");
        assert_eq!(snaps.get(&obj), Some(&m));
        assert!(!missing.own().is_missing(&obj));
    }

    #[test]
    fn test_serve_pull_registers_and_dedupes() {
        let (mut e, _snaps, _m) = engine();
        let plan = TransferPlan {
            object: ObjectId::head("o"),
            version: Version::new(1, 1),
            data_subset: IntervalSet::from_range(0, 8),
            clone_subsets: BTreeMap::new(),
            membership: Default::default(),
        };

        let effects = e.serve_pull(ReplicaId::new(1), plan.clone());
        assert!(matches!(
            &effects[..],
            [Effect::SendPush { to, .. }] if *to == ReplicaId::new(1)
        ));
        assert!(e.pushing_to(&plan.object).unwrap().contains(&ReplicaId::new(1)));

        // The same requester asking again gets nothing until its reply
        // retires the push; a different requester is a distinct push.
        assert!(e.serve_pull(ReplicaId::new(1), plan.clone()).is_empty());
        assert_eq!(e.serve_pull(ReplicaId::new(2), plan.clone()).len(), 1);

        assert!(e.on_push_reply(&plan.object, ReplicaId::new(1)));
        assert_eq!(e.serve_pull(ReplicaId::new(1), plan).len(), 1);
    }
}
