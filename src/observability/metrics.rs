//! Metrics registry for the shard core
//!
//! Per OBSERVABILITY.md:
//! - Counters only (no gauges, no histograms)
//! - Monotonic increase, reset only on process start
//! - Thread-safe but lock-minimal (Relaxed atomics; metrics tolerate
//!   eventual consistency)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one shard.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Writes accepted and assigned a transaction id
    writes_accepted: AtomicU64,
    /// Writes rejected with a stale old_version
    writes_stale_rejected: AtomicU64,
    /// Writes parked behind an earlier write on the same object
    writes_deferred: AtomicU64,
    /// Writes that failed terminally at local apply
    writes_failed: AtomicU64,
    /// Acks emitted to clients
    acks_sent: AtomicU64,
    /// Commits emitted to clients
    commits_sent: AtomicU64,
    /// Replica-failure notifications processed
    replica_failures: AtomicU64,
    /// Writes completed with fewer than all replicas durable
    degraded_completions: AtomicU64,
    /// Pulls started
    pulls_started: AtomicU64,
    /// Pushes started
    pushes_started: AtomicU64,
    /// Objects recovered locally (pull completions)
    objects_recovered: AtomicU64,
    /// Push payloads rejected by verification
    pushes_rejected: AtomicU64,
    /// Recovery cancellations (membership changes)
    recovery_cancellations: AtomicU64,
}

impl MetricsRegistry {
    /// Creates a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_writes_accepted(&self) {
        self.writes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_stale_rejected(&self) {
        self.writes_stale_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_deferred(&self) {
        self.writes_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_acks_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_commits_sent(&self) {
        self.commits_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replica_failures(&self) {
        self.replica_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_degraded_completions(&self) {
        self.degraded_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pulls_started(&self) {
        self.pulls_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pushes_started(&self) {
        self.pushes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_objects_recovered(&self) {
        self.objects_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pushes_rejected(&self) {
        self.pushes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_recovery_cancellations(&self) {
        self.recovery_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough point-in-time snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_accepted: self.writes_accepted.load(Ordering::Relaxed),
            writes_stale_rejected: self.writes_stale_rejected.load(Ordering::Relaxed),
            writes_deferred: self.writes_deferred.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            commits_sent: self.commits_sent.load(Ordering::Relaxed),
            replica_failures: self.replica_failures.load(Ordering::Relaxed),
            degraded_completions: self.degraded_completions.load(Ordering::Relaxed),
            pulls_started: self.pulls_started.load(Ordering::Relaxed),
            pushes_started: self.pushes_started.load(Ordering::Relaxed),
            objects_recovered: self.objects_recovered.load(Ordering::Relaxed),
            pushes_rejected: self.pushes_rejected.load(Ordering::Relaxed),
            recovery_cancellations: self.recovery_cancellations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values, serializable for the host's status
/// surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub writes_accepted: u64,
    pub writes_stale_rejected: u64,
    pub writes_deferred: u64,
    pub writes_failed: u64,
    pub acks_sent: u64,
    pub commits_sent: u64,
    pub replica_failures: u64,
    pub degraded_completions: u64,
    pub pulls_started: u64,
    pub pushes_started: u64,
    pub objects_recovered: u64,
    pub pushes_rejected: u64,
    pub recovery_cancellations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let m = MetricsRegistry::new();
        let s = m.snapshot();
        assert_eq!(s.writes_accepted, 0);
        assert_eq!(s.objects_recovered, 0);
    }

    #[test]
    fn test_counters_increment() {
        let m = MetricsRegistry::new();
        m.increment_writes_accepted();
        m.increment_writes_accepted();
        m.increment_acks_sent();
        let s = m.snapshot();
        assert_eq!(s.writes_accepted, 2);
        assert_eq!(s.acks_sent, 1);
        assert_eq!(s.commits_sent, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let m = MetricsRegistry::new();
        m.increment_pulls_started();
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(json.contains("\"pulls_started\":1"));
    }
}
