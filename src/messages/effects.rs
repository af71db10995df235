//! Outbound effects
//!
//! Per SHARD_MODEL.md §5: the shard core is single-threaded and never
//! performs I/O. Every outward action — a peer send, a storage submit, a
//! client response — is emitted as an [`Effect`] in deterministic order and
//! drained by the host between turns. Between emitting an effect and the
//! corresponding completion entry point, the core may process other
//! messages; all state is inspectable mid-flight.

use super::client::{ClientResponse, RequestId};
use super::peer::{PeerMessage, TransferPlan};
use crate::object::{ObjectId, ReplicaId, TxnId};
use crate::storage::Transaction;

/// One outward action for the host to perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Send a peer message.
    SendPeer { to: ReplicaId, message: PeerMessage },
    /// Send a push: the host copies the plan's byte ranges out of local
    /// storage into a `PushMessage` payload and stamps the checksum.
    /// The core cannot read object data; only the engine can.
    SendPush { to: ReplicaId, plan: TransferPlan },
    /// Submit a transaction to the storage engine. Exactly one completion
    /// must come back via `on_local_apply(tid, ..)`.
    SubmitStorage { tid: TxnId, txn: Transaction },
    /// Deliver a response to the client session.
    Respond(ClientResponse),
    /// Re-dispatch a read that was queued behind a read-balance
    /// transition.
    ReplayRead { object: ObjectId, request: RequestId },
}

impl Effect {
    /// Effect kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::SendPeer { .. } => "send_peer",
            Effect::SendPush { .. } => "send_push",
            Effect::SubmitStorage { .. } => "submit_storage",
            Effect::Respond(_) => "respond",
            Effect::ReplayRead { .. } => "replay_read",
        }
    }
}
