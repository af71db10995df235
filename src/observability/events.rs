//! Observable shard events
//!
//! Per OBSERVABILITY.md, every externally meaningful state transition in
//! the write and recovery paths has a typed event. Events are explicit:
//! no format strings, no ad-hoc names at call sites.

use std::fmt;

/// Observable events in the shard core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Write path
    /// Write accepted and assigned a transaction id
    WriteAccepted,
    /// Write parked behind an earlier in-flight write on the same object
    WriteDeferred,
    /// Write parked until the primary recovers the object
    WriteAwaitingRecovery,
    /// Write rejected: stale old_version
    WriteStaleRejected,
    /// Local transaction durably applied
    WriteApplied,
    /// Ack emitted to the client
    AckSent,
    /// Commit emitted to the client
    CommitSent,
    /// Write failed terminally (storage apply failure)
    WriteFailed,

    // Replica sub-operations
    /// Replicated transaction received
    SubOpReceived,
    /// Replicated transaction durably applied
    SubOpApplied,

    // Peers
    /// Replica reported failed; wait sets degraded
    ReplicaFailed,
    /// Replica set changed
    MembershipChanged,

    // Recovery
    /// Pull started for a missing object
    PullStarted,
    /// Pull completed; object recovered locally
    PullCompleted,
    /// Push started toward a replica
    PushStarted,
    /// Push acknowledged by the destination
    PushCompleted,
    /// Push payload failed verification and was discarded
    PushRejected,
    /// No peer could serve a pull; the object stays missing
    PullSourceUnavailable,
    /// A recovery install failed at storage; the pull will be retried
    InstallFailed,
    /// All recovery state cleared (membership change)
    RecoveryCancelled,
    /// A storage completion arrived for a transaction nobody tracks
    UnknownCompletion,

    // Read balancing
    /// Object became eligible for balanced reads
    ReadBalanceEnabled,
    /// Object began losing balanced-read eligibility
    ReadBalanceDraining,
    /// Transition settled; queued reads replayed
    ReadBalanceSettled,
}

impl Event {
    /// Event name as logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::WriteAccepted => "WRITE_ACCEPTED",
            Event::WriteDeferred => "WRITE_DEFERRED",
            Event::WriteAwaitingRecovery => "WRITE_AWAITING_RECOVERY",
            Event::WriteStaleRejected => "WRITE_STALE_REJECTED",
            Event::WriteApplied => "WRITE_APPLIED",
            Event::AckSent => "ACK_SENT",
            Event::CommitSent => "COMMIT_SENT",
            Event::WriteFailed => "WRITE_FAILED",
            Event::SubOpReceived => "SUBOP_RECEIVED",
            Event::SubOpApplied => "SUBOP_APPLIED",
            Event::ReplicaFailed => "REPLICA_FAILED",
            Event::MembershipChanged => "MEMBERSHIP_CHANGED",
            Event::PullStarted => "PULL_STARTED",
            Event::PullCompleted => "PULL_COMPLETED",
            Event::PushStarted => "PUSH_STARTED",
            Event::PushCompleted => "PUSH_COMPLETED",
            Event::PushRejected => "PUSH_REJECTED",
            Event::PullSourceUnavailable => "PULL_SOURCE_UNAVAILABLE",
            Event::InstallFailed => "INSTALL_FAILED",
            Event::RecoveryCancelled => "RECOVERY_CANCELLED",
            Event::UnknownCompletion => "UNKNOWN_COMPLETION",
            Event::ReadBalanceEnabled => "READ_BALANCE_ENABLED",
            Event::ReadBalanceDraining => "READ_BALANCE_DRAINING",
            Event::ReadBalanceSettled => "READ_BALANCE_SETTLED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
