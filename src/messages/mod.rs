//! Message content and outbound effects
//!
//! Wire encodings are the messaging collaborator's concern; this module
//! defines what crosses the seam in both directions: inbound peer
//! messages and client requests, outbound effects.

mod client;
mod effects;
mod peer;

pub use client::{ClientReply, ClientResponse, RequestId, WriteRequest};
pub use effects::Effect;
pub use peer::{PeerMessage, PushMessage, ReplicateMessage, TransferPlan};
