//! Replica-side handling of replicated writes
//!
//! Per WRITE_PROTOCOL.md §6: a replica applies the primary's transaction
//! verbatim. It sends the ack when the write is ordered (here: on receipt,
//! since ordering is the receive order) and the commit when the apply is
//! durable, carrying its stable-through version. The replica keeps no
//! long-lived record; a replied sub-operation is forgotten.

use crate::messages::{Effect, PeerMessage, ReplicateMessage};
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::storage::ApplyResult;
use crate::version::Version;
use std::collections::BTreeMap;

/// Lifecycle of one replicated write on a replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubOpState {
    /// Received and ordered; not yet handed to storage.
    Received,
    /// Submitted to the storage engine.
    LocallyApplying,
    /// Durably applied; replies sent.
    LocallyApplied,
}

/// One replicated write in flight on a replica.
#[derive(Debug)]
pub struct SubOp {
    primary: ReplicaId,
    object: ObjectId,
    at_version: Version,
    state: SubOpState,
}

impl SubOp {
    pub fn state(&self) -> SubOpState {
        self.state
    }

    pub fn object(&self) -> &ObjectId {
        &self.object
    }
}

/// Tracks replicated writes from receipt to reply.
#[derive(Debug)]
pub struct SubOpTracker {
    self_id: ReplicaId,
    subops: BTreeMap<TxnId, SubOp>,
    /// Version through which this replica's log is stable; sent with
    /// every commit so the primary can bound log trimming.
    complete_thru: Version,
}

impl SubOpTracker {
    pub fn new(self_id: ReplicaId) -> Self {
        Self {
            self_id,
            subops: BTreeMap::new(),
            complete_thru: Version::ZERO,
        }
    }

    /// True if `tid` names a replicated write still in flight here.
    pub fn owns(&self, tid: TxnId) -> bool {
        self.subops.contains_key(&tid)
    }

    /// The sub-operation for `tid`, if still in flight.
    pub fn subop(&self, tid: TxnId) -> Option<&SubOp> {
        self.subops.get(&tid)
    }

    /// This replica's stable-through version.
    pub fn complete_thru(&self) -> Version {
        self.complete_thru
    }

    /// Accepts a replicated write: the ack goes back immediately (receipt
    /// is ordering) and the transaction goes to storage. A duplicate tid
    /// is ignored; the original is still in flight and will reply.
    pub fn on_replicate(&mut self, msg: ReplicateMessage) -> Vec<Effect> {
        if self.subops.contains_key(&msg.tid) {
            return Vec::new();
        }

        let mut subop = SubOp {
            primary: msg.from,
            object: msg.object,
            at_version: msg.at_version,
            state: SubOpState::Received,
        };

        let mut effects = Vec::new();
        if msg.ack_wanted {
            effects.push(Effect::SendPeer {
                to: msg.from,
                message: PeerMessage::Ack {
                    tid: msg.tid,
                    from: self.self_id,
                },
            });
        }
        effects.push(Effect::SubmitStorage {
            tid: msg.tid,
            txn: msg.txn,
        });

        subop.state = SubOpState::LocallyApplying;
        self.subops.insert(msg.tid, subop);
        effects
    }

    /// Storage completion for a replicated write. On success the commit
    /// goes back with the updated stable-through version and the record
    /// is dropped. On failure nothing is sent: the primary learns of this
    /// replica through failure notification, never through a reply.
    pub fn on_local_apply(&mut self, tid: TxnId, result: ApplyResult) -> Vec<Effect> {
        let mut subop = match self.subops.remove(&tid) {
            Some(s) => s,
            None => return Vec::new(),
        };
        match result {
            ApplyResult::Applied => {
                subop.state = SubOpState::LocallyApplied;
                if subop.at_version > self.complete_thru {
                    self.complete_thru = subop.at_version;
                }
                vec![Effect::SendPeer {
                    to: subop.primary,
                    message: PeerMessage::Commit {
                        tid,
                        from: self.self_id,
                        complete_thru: self.complete_thru,
                    },
                }]
            }
            ApplyResult::Failed { .. } => Vec::new(),
        }
    }
}
