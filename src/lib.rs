//! repshard - a strict, deterministic write-replication and recovery core
//! for object-store shards
//!
//! One [`shard::Shard`] owns one shard of the store on one node: client
//! writes are ordered, replicated, and acknowledged in two phases (ack
//! when every replica has the write ordered, commit when every replica
//! has it durable); missing objects are recovered by pulling and pushing
//! snapshot-aware byte-range subsets between replicas.
//!
//! The core performs no I/O. Outward actions are emitted as
//! [`messages::Effect`] values for the host to perform; completions
//! re-enter through the shard's entry points. Everything is
//! single-threaded and deterministic.

pub mod membership;
pub mod messages;
pub mod object;
pub mod observability;
pub mod reads;
pub mod recovery;
pub mod shard;
pub mod snapshots;
pub mod storage;
pub mod version;
pub mod write;
