//! Write Completion Invariant Tests
//!
//! Per WRITE_PROTOCOL.md:
//! - The ack goes to the client only after every replica ordered the
//!   write and the local apply landed
//! - The commit goes only after every replica durably applied it
//! - Each response is sent at most once; a commit implies the ack
//! - Replica failure shrinks wait sets monotonically and can only
//!   complete writes, never un-complete them
//! - Writes to one object are issued strictly in acceptance order

use repshard::membership::{MissingInfo, ShardMembership};
use repshard::messages::{ClientReply, Effect, PeerMessage, WriteRequest};
use repshard::object::{ReplicaId, TxnId};
use repshard::shard::{Admission, Shard, ShardConfig, ShardError};
use repshard::snapshots::SnapContext;
use repshard::storage::ApplyResult;
use repshard::version::Version;
use repshard::write::WriteError;
use std::collections::BTreeSet;
use uuid::Uuid;

fn membership(primary: u32, peers: &[u32]) -> ShardMembership {
    let peers: BTreeSet<ReplicaId> = peers.iter().map(|&r| ReplicaId::new(r)).collect();
    ShardMembership::new(1, ReplicaId::new(primary), peers)
}

fn primary_shard(peers: &[u32]) -> Shard {
    Shard::new(
        ShardConfig::new(7, ReplicaId::new(0)),
        membership(0, peers),
        MissingInfo::default(),
    )
    .expect("valid config")
}

fn write_request(object: &str, old_version: Version) -> WriteRequest {
    WriteRequest {
        id: Uuid::new_v4(),
        object: object.to_string(),
        offset: 0,
        data: vec![0xAB; 8],
        old_version,
        snapc: SnapContext::empty(),
    }
}

fn client_replies(effects: &[Effect]) -> Vec<ClientReply> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Respond(r) => Some(r.reply.clone()),
            _ => None,
        })
        .collect()
}

fn issue(shard: &mut Shard, object: &str, old_version: Version) -> TxnId {
    match shard.submit_write(write_request(object, old_version)).unwrap() {
        Admission::Issued(tid) => tid,
        other => panic!("expected immediate issue, got {:?}", other),
    }
}

// =============================================================================
// TWO-PHASE COMPLETION
// =============================================================================

/// Full round against two replicas: exactly one ack after the last
/// replica ack, exactly one commit after the last replica commit.
#[test]
fn test_two_replica_completion_order() {
    let mut shard = primary_shard(&[1, 2]);
    let tid = issue(&mut shard, "obj", Version::ZERO);

    // Issue: one replicate per replica, one local submit.
    let effects = shard.take_effects();
    let sends = effects
        .iter()
        .filter(|e| matches!(e, Effect::SendPeer { .. }))
        .count();
    let submits = effects
        .iter()
        .filter(|e| matches!(e, Effect::SubmitStorage { .. }))
        .count();
    assert_eq!(sends, 2);
    assert_eq!(submits, 1);

    shard.on_local_apply(tid, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Ack {
        tid,
        from: ReplicaId::new(1),
    });
    assert!(client_replies(&shard.take_effects()).is_empty());

    shard.handle_peer_message(PeerMessage::Ack {
        tid,
        from: ReplicaId::new(2),
    });
    assert!(matches!(
        client_replies(&shard.take_effects())[..],
        [ClientReply::Ack { .. }]
    ));

    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: Version::new(1, 1),
    });
    assert!(client_replies(&shard.take_effects()).is_empty());

    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(2),
        complete_thru: Version::new(1, 1),
    });
    assert!(matches!(
        client_replies(&shard.take_effects())[..],
        [ClientReply::Commit { .. }]
    ));

    // Both wait sets empty and commit sent: the record is gone.
    assert!(shard.write_op(tid).is_none());

    let metrics = shard.metrics();
    assert_eq!(metrics.acks_sent, 1);
    assert_eq!(metrics.commits_sent, 1);
    assert_eq!(metrics.degraded_completions, 0);
}

/// The ack must wait for the local apply even when every replica has
/// already acknowledged.
#[test]
fn test_ack_gated_on_local_apply() {
    let mut shard = primary_shard(&[1]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();

    shard.handle_peer_message(PeerMessage::Ack {
        tid,
        from: ReplicaId::new(1),
    });
    assert!(client_replies(&shard.take_effects()).is_empty());

    shard.on_local_apply(tid, ApplyResult::Applied);
    assert!(matches!(
        client_replies(&shard.take_effects())[..],
        [ClientReply::Ack { .. }]
    ));
}

/// A commit from a replica implies its ack. When the lone replica skips
/// straight to commit, the client still sees ack before commit.
#[test]
fn test_commit_implies_ack() {
    let mut shard = primary_shard(&[1]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);

    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: Version::new(1, 1),
    });
    assert!(matches!(
        client_replies(&shard.take_effects())[..],
        [ClientReply::Ack { .. }, ClientReply::Commit { .. }]
    ));
    assert!(shard.write_op(tid).is_none());
}

/// Duplicate acks and commits never produce duplicate client responses.
#[test]
fn test_responses_at_most_once() {
    let mut shard = primary_shard(&[1, 2]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);

    for _ in 0..3 {
        shard.handle_peer_message(PeerMessage::Ack {
            tid,
            from: ReplicaId::new(1),
        });
        shard.handle_peer_message(PeerMessage::Ack {
            tid,
            from: ReplicaId::new(2),
        });
    }
    let acks = client_replies(&shard.take_effects())
        .iter()
        .filter(|r| matches!(r, ClientReply::Ack { .. }))
        .count();
    assert_eq!(acks, 1);
}

// =============================================================================
// REPLICA FAILURE
// =============================================================================

/// A write waiting only on a failed replica completes, degraded.
#[test]
fn test_failure_completes_waiting_write() {
    let mut shard = primary_shard(&[1, 2]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: Version::new(1, 1),
    });
    shard.take_effects();

    shard.on_replica_failure(ReplicaId::new(2));
    assert!(matches!(
        client_replies(&shard.take_effects())[..],
        [ClientReply::Ack { .. }, ClientReply::Commit { .. }]
    ));
    assert!(shard.write_op(tid).is_none());
    assert_eq!(shard.metrics().degraded_completions, 1);
    assert_eq!(shard.metrics().replica_failures, 1);
}

/// Failure of a replica that already committed changes nothing.
#[test]
fn test_failure_after_commit_is_harmless() {
    let mut shard = primary_shard(&[1, 2]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: Version::new(1, 1),
    });
    shard.take_effects();

    shard.on_replica_failure(ReplicaId::new(1));
    assert!(client_replies(&shard.take_effects()).is_empty());

    let op = shard.write_op(tid).expect("still waiting on replica 2");
    assert!(op.waitfor_commit().contains(&ReplicaId::new(2)));
}

// =============================================================================
// VERSION CHECKING AND PER-OBJECT ORDERING
// =============================================================================

/// A write against anything but the last accepted version is rejected;
/// the client retries with the fresh version and wins.
#[test]
fn test_stale_version_rejected_then_retry_succeeds() {
    let mut shard = primary_shard(&[1]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    let at_version = shard.write_op(tid).unwrap().at_version();
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: at_version,
    });
    shard.take_effects();

    let err = shard
        .submit_write(write_request("obj", Version::ZERO))
        .unwrap_err();
    assert!(matches!(
        err,
        ShardError::Write(WriteError::StaleVersion { .. })
    ));
    assert_eq!(shard.metrics().writes_stale_rejected, 1);

    issue(&mut shard, "obj", at_version);
}

/// A second write on the same object parks until the first retires, then
/// issues automatically.
#[test]
fn test_per_object_ordering() {
    let mut shard = primary_shard(&[1]);
    let tid1 = issue(&mut shard, "obj", Version::ZERO);
    let at1 = shard.write_op(tid1).unwrap().at_version();
    shard.take_effects();

    let tid2 = match shard.submit_write(write_request("obj", at1)).unwrap() {
        Admission::Deferred(tid) => tid,
        other => panic!("expected deferral, got {:?}", other),
    };
    assert!(shard.take_effects().is_empty());
    assert!(shard.write_op(tid2).is_none());

    shard.on_local_apply(tid1, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Commit {
        tid: tid1,
        from: ReplicaId::new(1),
        complete_thru: at1,
    });

    // Retiring the first write issues the second.
    let effects = shard.take_effects();
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::SubmitStorage { tid, .. } if *tid == tid2)));
    assert!(shard.write_op(tid2).is_some());

    // Independent objects never queue behind each other.
    issue(&mut shard, "other", Version::ZERO);
}

/// A storage apply failure is terminal for that write alone: one error
/// response, and the next write on the object proceeds.
#[test]
fn test_storage_failure_terminal_for_single_write() {
    let mut shard = primary_shard(&[1]);
    let tid1 = issue(&mut shard, "obj", Version::ZERO);
    let at1 = shard.write_op(tid1).unwrap().at_version();
    shard.take_effects();

    let request2 = write_request("obj", at1);
    shard.submit_write(request2).unwrap();

    shard.on_local_apply(
        tid1,
        ApplyResult::Failed {
            reason: "short write".to_string(),
        },
    );
    let effects = shard.take_effects();
    let replies = client_replies(&effects);
    assert!(matches!(replies[..], [ClientReply::Error { .. }]));
    // The successor was issued in the same turn.
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::SubmitStorage { .. })));
    assert_eq!(shard.metrics().writes_failed, 1);
}

/// Writes with an invalid snapshot context never enter the pipeline.
#[test]
fn test_invalid_snap_context_rejected() {
    use repshard::object::SnapId;
    let mut shard = primary_shard(&[1]);
    let mut request = write_request("obj", Version::ZERO);
    // Ids out of order: context is internally inconsistent.
    request.snapc = SnapContext::new(SnapId::new(2), vec![SnapId::new(1), SnapId::new(3)]);

    assert!(matches!(
        shard.submit_write(request),
        Err(ShardError::Write(WriteError::InvalidSnapContext))
    ));
}

/// min_complete_thru is pinned by the slowest participant until every
/// replica has reported.
#[test]
fn test_min_complete_thru_bounds_trimming() {
    let mut shard = primary_shard(&[1, 2]);
    let tid = issue(&mut shard, "obj", Version::ZERO);
    shard.take_effects();
    shard.on_local_apply(tid, ApplyResult::Applied);
    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(1),
        complete_thru: Version::new(1, 1),
    });

    assert_eq!(shard.min_complete_thru(), Some(Version::ZERO));

    shard.handle_peer_message(PeerMessage::Commit {
        tid,
        from: ReplicaId::new(2),
        complete_thru: Version::new(1, 1),
    });
    // Nothing in flight: trimming is unconstrained by the write path.
    assert_eq!(shard.min_complete_thru(), None);
}
