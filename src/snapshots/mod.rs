//! Snapshot membership and byte-range subset computation
//!
//! Per SNAPSHOT_SUBSETS.md: snapshot-aware recovery and clone-aware writes
//! share one body of pure range arithmetic. This module owns it:
//! - write-time snapshot context ([`SnapContext`])
//! - per-object clone history ([`SnapshotMembership`])
//! - minimal-transfer subset planning ([`compute_head_subset`],
//!   [`compute_clone_subset`])
//! - clone materialization on the write path ([`prepare_clone`])

mod clone;
mod context;
mod membership;
mod subsets;

pub use clone::{prepare_clone, PreparedClone};
pub use context::SnapContext;
pub use membership::{CloneInfo, SnapshotMembership, SnapshotRegistry};
pub use subsets::{
    attribute_sources, compute_clone_subset, compute_head_subset, SourceAttribution, SubsetPlan,
};
