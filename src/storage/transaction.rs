//! Storage transactions
//!
//! Per WRITE_PROTOCOL.md §2: a transaction is the complete, ordered list of
//! storage mutations for one write (or one recovery install). It is built
//! by the coordinator, replicated verbatim to peers, and applied atomically
//! by the storage engine. Atomicity is the engine's obligation.

use crate::object::{IntervalSet, ObjectId, SnapId};
use serde::{Deserialize, Serialize};

/// A single storage mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionOp {
    /// Write `data` into `object` starting at `offset`.
    Write {
        object: ObjectId,
        offset: u64,
        data: Vec<u8>,
    },
    /// Copy the given byte ranges from `src` into `dst` without moving data
    /// through this core (engine-side clone).
    CloneRange {
        src: ObjectId,
        dst: ObjectId,
        ranges: IntervalSet,
    },
    /// Record the snapshot ids preserved by a clone object.
    SetSnaps { object: ObjectId, snaps: Vec<SnapId> },
}

/// An ordered, atomic batch of storage mutations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    ops: Vec<TransactionOp>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the transaction mutates nothing.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The ordered op list.
    pub fn ops(&self) -> &[TransactionOp] {
        &self.ops
    }

    /// Appends a raw op.
    pub fn push(&mut self, op: TransactionOp) {
        self.ops.push(op);
    }

    /// Appends a byte write.
    pub fn write(&mut self, object: ObjectId, offset: u64, data: Vec<u8>) {
        self.ops.push(TransactionOp::Write {
            object,
            offset,
            data,
        });
    }

    /// Appends an engine-side range clone.
    pub fn clone_range(&mut self, src: ObjectId, dst: ObjectId, ranges: IntervalSet) {
        self.ops.push(TransactionOp::CloneRange { src, dst, ranges });
    }

    /// Appends a snapshot-id record for a clone object.
    pub fn set_snaps(&mut self, object: ObjectId, snaps: Vec<SnapId>) {
        self.ops.push(TransactionOp::SetSnaps { object, snaps });
    }
}

/// Outcome of one transaction apply, reported by the storage engine.
///
/// Per WRITE_PROTOCOL.md §5.3: apply failure is fatal to the single write
/// it belongs to and is never retried inside this core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyResult {
    /// The transaction is durably applied.
    Applied,
    /// The engine could not apply the transaction.
    Failed {
        /// Engine-reported reason, surfaced verbatim to the client.
        reason: String,
    },
}

impl ApplyResult {
    /// True if the apply succeeded.
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyResult::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_preserves_op_order() {
        let head = ObjectId::head("o");
        let clone = ObjectId::clone_at("o", SnapId::new(1));

        let mut txn = Transaction::new();
        txn.clone_range(head.clone(), clone.clone(), IntervalSet::from_range(0, 8));
        txn.set_snaps(clone.clone(), vec![SnapId::new(1)]);
        txn.write(head.clone(), 4, vec![0xAB; 4]);

        assert_eq!(txn.len(), 3);
        assert!(matches!(txn.ops()[0], TransactionOp::CloneRange { .. }));
        assert!(matches!(txn.ops()[1], TransactionOp::SetSnaps { .. }));
        assert!(matches!(txn.ops()[2], TransactionOp::Write { .. }));
    }

    #[test]
    fn test_empty_transaction() {
        let txn = Transaction::new();
        assert!(txn.is_empty());
        assert_eq!(txn.len(), 0);
    }

    #[test]
    fn test_apply_result() {
        assert!(ApplyResult::Applied.is_applied());
        assert!(!ApplyResult::Failed {
            reason: "io".to_string()
        }
        .is_applied());
    }
}
