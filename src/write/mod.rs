//! Replicated-write completion protocol
//!
//! Per WRITE_PROTOCOL.md, a write is ordered once every replica has it
//! queued and durable once every replica has applied it. The primary-side
//! pipeline lives in [`WriteCoordinator`]; the replica-side handling in
//! [`SubOpTracker`]. Per-object ordering is enforced by the pending queue:
//! one write per object in flight, the rest parked in acceptance order.

mod coordinator;
mod errors;
mod pending;
mod rep_gather;
mod subop;

pub use coordinator::{WriteAdmission, WriteCoordinator};
pub use errors::{WriteError, WriteResult};
pub use pending::PendingOperationQueue;
pub use rep_gather::WriteOperation;
pub use subop::{SubOp, SubOpState, SubOpTracker};
