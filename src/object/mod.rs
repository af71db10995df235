//! Object identities and byte-range primitives
//!
//! Per SHARD_MODEL.md §2: everything in the shard is addressed by value
//! identity (object, replica, transaction), and all byte-range reasoning
//! is done on coalescing interval sets.

mod identity;
mod intervals;

pub use identity::{ObjectId, ReplicaId, SnapId, SnapSelector, TxnId};
pub use intervals::IntervalSet;
