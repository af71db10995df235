//! Client-facing write requests and responses
//!
//! Per WRITE_PROTOCOL.md §1: every accepted write produces exactly one ack
//! response followed by exactly one commit response, or exactly one error
//! response. Never both an error and a success; never a silent drop.

use crate::object::TxnId;
use crate::snapshots::SnapContext;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client request handle, assigned by the session collaborator.
pub type RequestId = Uuid;

/// A client write against an object head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Request handle echoed in every response.
    pub id: RequestId,
    /// Logical object name (writes always target the head).
    pub object: String,
    /// Byte offset of the write.
    pub offset: u64,
    /// Bytes to write.
    pub data: Vec<u8>,
    /// Version the client last observed for the object.
    pub old_version: Version,
    /// Snapshot context the client observed.
    pub snapc: SnapContext,
}

/// The three terminal reply kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientReply {
    /// Write accepted and ordered on all required replicas.
    Ack { at_version: Version },
    /// Write durably applied on all required replicas.
    Commit { at_version: Version },
    /// Write failed terminally; the client must re-request.
    Error { reason: String },
}

/// One response toward the client session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientResponse {
    /// The request this responds to.
    pub request: RequestId,
    /// Transaction id, when the write got far enough to be assigned one.
    pub tid: Option<TxnId>,
    /// The reply.
    pub reply: ClientReply,
}

impl ClientResponse {
    /// An ack response.
    pub fn ack(request: RequestId, tid: TxnId, at_version: Version) -> Self {
        Self {
            request,
            tid: Some(tid),
            reply: ClientReply::Ack { at_version },
        }
    }

    /// A commit response.
    pub fn commit(request: RequestId, tid: TxnId, at_version: Version) -> Self {
        Self {
            request,
            tid: Some(tid),
            reply: ClientReply::Commit { at_version },
        }
    }

    /// An error response.
    pub fn error(request: RequestId, tid: Option<TxnId>, reason: impl Into<String>) -> Self {
        Self {
            request,
            tid,
            reply: ClientReply::Error {
                reason: reason.into(),
            },
        }
    }

    /// True if this is a terminal error.
    pub fn is_error(&self) -> bool {
        matches!(self.reply, ClientReply::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_constructors() {
        let req = Uuid::new_v4();
        let tid = TxnId::new(3);
        let v = Version::new(1, 6);

        assert!(matches!(
            ClientResponse::ack(req, tid, v).reply,
            ClientReply::Ack { .. }
        ));
        assert!(matches!(
            ClientResponse::commit(req, tid, v).reply,
            ClientReply::Commit { .. }
        ));
        assert!(ClientResponse::error(req, None, "stale").is_error());
    }
}
