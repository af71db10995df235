//! Balanced-read gating
//!
//! Per READ_BALANCE.md, reads normally go to the primary. An object can be
//! marked read-balanced, allowing replicas to serve reads, but leaving
//! that state is a transition, not a flip: while draining, new reads are
//! queued so none races the replicas' last balanced responses. When the
//! transition settles, queued reads are replayed against the primary in
//! arrival order.

use crate::messages::{Effect, RequestId};
use crate::object::ObjectId;
use std::collections::{BTreeMap, BTreeSet};

/// Where an admitted read may be served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadAdmission {
    /// Any replica may serve this read.
    Balanced,
    /// Only the primary may serve this read.
    Primary,
    /// The object is mid-transition; the read is queued for replay.
    Queued,
}

/// Per-shard read-balance state.
#[derive(Debug, Default)]
pub struct ReadGate {
    /// Objects replicas may serve.
    balanced: BTreeSet<ObjectId>,
    /// Objects draining out of the balanced set.
    unbalancing: BTreeSet<ObjectId>,
    /// Reads queued during a drain, in arrival order.
    waiting: BTreeMap<ObjectId, Vec<RequestId>>,
}

impl ReadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if replicas may currently serve reads of `object`.
    pub fn is_read_balanced(&self, object: &ObjectId) -> bool {
        self.balanced.contains(object) && !self.unbalancing.contains(object)
    }

    /// True if `object` is draining out of the balanced set.
    pub fn is_draining(&self, object: &ObjectId) -> bool {
        self.unbalancing.contains(object)
    }

    /// Reads queued behind `object`'s drain.
    pub fn queued_count(&self, object: &ObjectId) -> usize {
        self.waiting.get(object).map(Vec::len).unwrap_or(0)
    }

    /// Marks `object` balanced. Rejected while a drain is still in
    /// progress; the caller retries after settling. Returns whether the
    /// state changed.
    pub fn enable_balancing(&mut self, object: ObjectId) -> bool {
        if self.unbalancing.contains(&object) {
            return false;
        }
        self.balanced.insert(object)
    }

    /// Begins draining `object` out of the balanced set. Returns true if
    /// a drain started; a non-balanced object is a no-op.
    pub fn disable_balancing(&mut self, object: ObjectId) -> bool {
        if !self.balanced.contains(&object) || self.unbalancing.contains(&object) {
            return false;
        }
        self.unbalancing.insert(object)
    }

    /// Admits a read: balanced, primary-only, or queued mid-drain.
    pub fn admit_read(&mut self, object: &ObjectId, request: RequestId) -> ReadAdmission {
        if self.unbalancing.contains(object) {
            self.waiting.entry(object.clone()).or_default().push(request);
            return ReadAdmission::Queued;
        }
        if self.balanced.contains(object) {
            ReadAdmission::Balanced
        } else {
            ReadAdmission::Primary
        }
    }

    /// Completes `object`'s drain: the object leaves both sets and every
    /// queued read is replayed in arrival order. Returns the replay
    /// effects, or `None` if no drain was in progress.
    pub fn settle(&mut self, object: &ObjectId) -> Option<Vec<Effect>> {
        if !self.unbalancing.remove(object) {
            return None;
        }
        self.balanced.remove(object);
        let effects = self
            .waiting
            .remove(object)
            .unwrap_or_default()
            .into_iter()
            .map(|request| Effect::ReplayRead {
                object: object.clone(),
                request,
            })
            .collect();
        Some(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_reads_default_to_primary() {
        let mut gate = ReadGate::new();
        let obj = ObjectId::head("o");
        assert_eq!(gate.admit_read(&obj, Uuid::new_v4()), ReadAdmission::Primary);
        assert!(!gate.is_read_balanced(&obj));
    }

    #[test]
    fn test_balanced_reads_after_enable() {
        let mut gate = ReadGate::new();
        let obj = ObjectId::head("o");
        assert!(gate.enable_balancing(obj.clone()));
        assert!(gate.is_read_balanced(&obj));
        assert_eq!(gate.admit_read(&obj, Uuid::new_v4()), ReadAdmission::Balanced);
    }

    #[test]
    fn test_drain_queues_reads_in_order() {
        let mut gate = ReadGate::new();
        let obj = ObjectId::head("o");
        gate.enable_balancing(obj.clone());
        assert!(gate.disable_balancing(obj.clone()));
        assert!(!gate.is_read_balanced(&obj));

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(gate.admit_read(&obj, first), ReadAdmission::Queued);
        assert_eq!(gate.admit_read(&obj, second), ReadAdmission::Queued);
        assert_eq!(gate.queued_count(&obj), 2);

        let effects = gate.settle(&obj).expect("drain in progress");
        let replayed: Vec<RequestId> = effects
            .iter()
            .map(|e| match e {
                Effect::ReplayRead { request, .. } => *request,
                other => panic!("expected replay, got {:?}", other),
            })
            .collect();
        assert_eq!(replayed, vec![first, second]);

        // Settled: reads are primary-only until re-enabled.
        assert_eq!(gate.admit_read(&obj, Uuid::new_v4()), ReadAdmission::Primary);
    }

    #[test]
    fn test_enable_rejected_mid_drain() {
        let mut gate = ReadGate::new();
        let obj = ObjectId::head("o");
        gate.enable_balancing(obj.clone());
        gate.disable_balancing(obj.clone());
        assert!(!gate.enable_balancing(obj.clone()));

        gate.settle(&obj);
        assert!(gate.enable_balancing(obj));
    }

    #[test]
    fn test_disable_of_unbalanced_object_is_noop() {
        let mut gate = ReadGate::new();
        let obj = ObjectId::head("o");
        assert!(!gate.disable_balancing(obj.clone()));
        assert!(gate.settle(&obj).is_none());
    }
}
