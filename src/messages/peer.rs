//! Peer (replica-to-replica) messages
//!
//! Per SHARD_MODEL.md §6.2: the wire encoding belongs to the messaging
//! collaborator; this module defines message *content*. Every inbound
//! message is demultiplexed exactly once, at the shard boundary, by
//! matching on the [`PeerMessage`] variant.
//!
//! Push payloads carry a crc32 checksum over the raw bytes. The receiving
//! side verifies before installing; a mismatched payload is discarded.

use crate::object::{IntervalSet, ObjectId, ReplicaId, TxnId};
use crate::snapshots::SnapshotMembership;
use crate::storage::Transaction;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A replicated write, sent primary-to-peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateMessage {
    /// Replication transaction id assigned by the primary.
    pub tid: TxnId,
    /// The coordinating primary.
    pub from: ReplicaId,
    /// Head object the write targets.
    pub object: ObjectId,
    /// Version before the write.
    pub old_version: Version,
    /// Version after the write.
    pub at_version: Version,
    /// Transaction to apply verbatim.
    pub txn: Transaction,
    /// Whether the primary wants an explicit ack in addition to the commit.
    pub ack_wanted: bool,
}

/// Everything both ends need to move one object's byte-range subsets:
/// which object, at which version, which ranges of it and of its dependent
/// clones, and the membership the destination installs alongside the data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Object being transferred (head or clone identity).
    pub object: ObjectId,
    /// Version the transfer brings the object to.
    pub version: Version,
    /// Ranges of the object's own data.
    pub data_subset: IntervalSet,
    /// Ranges of dependent clone objects, keyed by clone identity.
    pub clone_subsets: BTreeMap<ObjectId, IntervalSet>,
    /// Snapshot membership of the object's logical name at the source.
    pub membership: SnapshotMembership,
}

impl TransferPlan {
    /// Bytes a payload honoring this plan must carry: the data subset
    /// first, then each clone subset in key order, each range ascending.
    pub fn expected_payload_len(&self) -> u64 {
        self.data_subset.total_bytes()
            + self
                .clone_subsets
                .values()
                .map(IntervalSet::total_bytes)
                .sum::<u64>()
    }

    /// True if the plan moves no bytes.
    pub fn is_empty(&self) -> bool {
        self.data_subset.is_empty() && self.clone_subsets.values().all(IntervalSet::is_empty)
    }
}

/// Object data in flight, source-to-destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    /// The sending replica.
    pub from: ReplicaId,
    /// What the payload contains.
    pub plan: TransferPlan,
    /// Raw bytes, laid out per [`TransferPlan::expected_payload_len`].
    pub payload: Vec<u8>,
    /// crc32 over `payload`.
    pub checksum: u32,
}

impl PushMessage {
    /// Assembles a push with the checksum stamped.
    pub fn assemble(from: ReplicaId, plan: TransferPlan, payload: Vec<u8>) -> Self {
        let checksum = crc32fast::hash(&payload);
        Self {
            from,
            plan,
            payload,
            checksum,
        }
    }

    /// True if the payload matches both the plan's length and the
    /// checksum. Anything else is transport corruption.
    pub fn verify_payload(&self) -> bool {
        self.payload.len() as u64 == self.plan.expected_payload_len()
            && crc32fast::hash(&self.payload) == self.checksum
    }
}

/// Tagged peer message, matched once at the shard boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Primary-to-peer replicated write.
    Replicate(ReplicateMessage),
    /// Peer-to-primary: write accepted and ordered.
    Ack {
        tid: TxnId,
        from: ReplicaId,
    },
    /// Peer-to-primary: write durably applied; `complete_thru` is the
    /// version through which the sender's log is stable.
    Commit {
        tid: TxnId,
        from: ReplicaId,
        complete_thru: Version,
    },
    /// Request for the plan's ranges (puller-to-source).
    Pull {
        from: ReplicaId,
        plan: TransferPlan,
    },
    /// Object data in flight.
    Push(PushMessage),
    /// Destination-to-source: push installed durably.
    PushReply {
        object: ObjectId,
        from: ReplicaId,
    },
}

impl PeerMessage {
    /// Message kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Replicate(_) => "replicate",
            PeerMessage::Ack { .. } => "ack",
            PeerMessage::Commit { .. } => "commit",
            PeerMessage::Pull { .. } => "pull",
            PeerMessage::Push(_) => "push",
            PeerMessage::PushReply { .. } => "push_reply",
        }
    }
}
