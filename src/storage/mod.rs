//! Durable-storage seam: transactions and apply outcomes
//!
//! Per SHARD_MODEL.md §6.1, the storage engine is an external collaborator.
//! This core decides *what* a transaction contains; the engine owns
//! encoding, placement, and durability. The contract is:
//!
//! - `Effect::SubmitStorage` hands a transaction to the engine
//! - exactly one completion per submitted transaction, delivered
//!   asynchronously via the shard's `on_local_apply`, never synchronously
//!
//! Transactions are PURE DATA: an ordered op list, no behavior beyond
//! construction and access.

mod transaction;

pub use transaction::{ApplyResult, Transaction, TransactionOp};
