//! Per-object write ordering
//!
//! Per WRITE_PROTOCOL.md §4: at most one write per object is issued at a
//! time. A write accepted while an earlier write on the same object is
//! still in flight is parked here, keyed by the transaction it waits
//! behind, and released in acceptance order when that transaction retires.

use super::rep_gather::WriteOperation;
use crate::object::TxnId;
use std::collections::{BTreeMap, VecDeque};

/// Accepted-but-unissued writes, keyed by the in-flight transaction each
/// queue waits behind.
#[derive(Debug, Default)]
pub struct PendingOperationQueue {
    queues: BTreeMap<TxnId, VecDeque<WriteOperation>>,
}

impl PendingOperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no writes are parked.
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of parked writes across all queues.
    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Parks `op` behind the in-flight transaction `behind`.
    pub fn defer(&mut self, behind: TxnId, op: WriteOperation) {
        self.queues.entry(behind).or_default().push_back(op);
    }

    /// Takes every write parked behind `behind`, in acceptance order.
    pub fn release(&mut self, behind: TxnId) -> VecDeque<WriteOperation> {
        self.queues.remove(&behind).unwrap_or_default()
    }

    /// Iterates all parked writes mutably, queue key order then
    /// acceptance order. Used to degrade wait sets on replica failure.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WriteOperation> + '_ {
        self.queues.values_mut().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectId;
    use crate::snapshots::{SnapContext, SnapshotMembership};
    use crate::storage::Transaction;
    use crate::version::Version;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn op(tid: u64) -> WriteOperation {
        WriteOperation::new(
            Uuid::new_v4(),
            TxnId::new(tid),
            ObjectId::head("o"),
            Transaction::new(),
            BTreeSet::new(),
            Version::new(1, tid),
            Version::new(1, tid + 1),
            SnapshotMembership::new(),
            SnapContext::empty(),
        )
    }

    #[test]
    fn test_release_preserves_acceptance_order() {
        let mut q = PendingOperationQueue::new();
        q.defer(TxnId::new(1), op(2));
        q.defer(TxnId::new(1), op(3));

        let released = q.release(TxnId::new(1));
        let tids: Vec<_> = released.iter().map(|o| o.tid()).collect();
        assert_eq!(tids, vec![TxnId::new(2), TxnId::new(3)]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_release_unknown_key_is_empty() {
        let mut q = PendingOperationQueue::new();
        assert!(q.release(TxnId::new(9)).is_empty());
    }

    #[test]
    fn test_len_counts_across_queues() {
        let mut q = PendingOperationQueue::new();
        q.defer(TxnId::new(1), op(2));
        q.defer(TxnId::new(5), op(6));
        assert_eq!(q.len(), 2);
    }
}
