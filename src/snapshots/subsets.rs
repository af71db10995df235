//! Snapshot subset computation
//!
//! Per SNAPSHOT_SUBSETS.md §5, recovery never moves whole objects when a
//! delta suffices. Given an object's snapshot membership and the set of
//! objects the destination is missing, these pure functions compute the
//! minimal byte ranges that must move:
//!
//! - the *data subset*: ranges of the recovered object itself that only it
//!   holds (its own delta)
//! - the *clone subsets*: for each missing clone the reconstruction
//!   depends on, the ranges attributable to that clone and not already
//!   re-covered by a newer one
//!
//! The walk runs newest to oldest and stops at the oldest clone or at full
//! coverage of the recovered extent, whichever comes first. Both functions
//! are pure: recomputing with the same inputs yields the identical plan.
//!
//! The same walk, unfiltered, is exposed as [`attribute_sources`]: it
//! names the owning clone for every byte of the recovered extent. The
//! install path replays it to clone untransmitted ranges from their
//! owners, so planner and installer cannot disagree on attribution.

use super::membership::SnapshotMembership;
use crate::membership::MissingSet;
use crate::object::{IntervalSet, ObjectId};
use std::collections::BTreeMap;

/// The minimal byte ranges required to reconstruct one object on a
/// destination with the given missing set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubsetPlan {
    /// Ranges of the recovered object's own data that must move.
    pub data_subset: IntervalSet,
    /// Ranges of dependent clone objects that must also move, keyed by
    /// clone identity.
    pub clone_subsets: BTreeMap<ObjectId, IntervalSet>,
}

impl SubsetPlan {
    /// A plan that moves nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total bytes the plan moves.
    pub fn total_bytes(&self) -> u64 {
        self.data_subset.total_bytes()
            + self
                .clone_subsets
                .values()
                .map(IntervalSet::total_bytes)
                .sum::<u64>()
    }
}

/// Attribution of a recovered object's extent to its sources: the
/// object's own delta, then each clone's surviving contribution, walked
/// newest to oldest (for clone targets, only clones older than the
/// target). Contributions are non-empty and appear in walk order.
///
/// An unknown clone target yields an empty attribution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceAttribution {
    /// Ranges the object's own data covers.
    pub own: IntervalSet,
    /// Per-clone contributions, newest first.
    pub clone_sources: Vec<(ObjectId, IntervalSet)>,
}

/// Names the owning source for every byte of `object`'s extent.
///
/// Planning filters this to the destination's missing set; installation
/// replays it as local clone-range ops. Both run the identical walk, so
/// a range never gets planned against one clone and installed from
/// another.
pub fn attribute_sources(
    membership: &SnapshotMembership,
    object: &ObjectId,
) -> SourceAttribution {
    let (extent, own_delta, newer_bound) = match object.snap() {
        Some(snap) => match membership.clone_info(snap) {
            Some(target) => (
                IntervalSet::from_range(0, target.size),
                target.delta.clone(),
                Some(snap),
            ),
            None => return SourceAttribution::default(),
        },
        None => {
            let extent = IntervalSet::from_range(0, membership.head_size());
            // No snapshot history: the head's own data is the whole
            // extent.
            if !membership.has_clones() {
                return SourceAttribution {
                    own: extent,
                    clone_sources: Vec::new(),
                };
            }
            (extent, membership.head_delta().clone(), None)
        }
    };

    let mut attribution = SourceAttribution {
        own: own_delta.intersection(&extent),
        clone_sources: Vec::new(),
    };
    let mut covered = own_delta;
    for clone in membership.clones().iter().rev() {
        if newer_bound.map(|bound| clone.snap >= bound).unwrap_or(false) {
            continue;
        }
        if covered.covers(&extent) {
            break;
        }
        let needed = clone.delta.difference(&covered);
        covered.union_with(&clone.delta);
        if !needed.is_empty() {
            attribution
                .clone_sources
                .push((ObjectId::clone_at(object.name(), clone.snap), needed));
        }
    }
    attribution
}

/// Computes the subsets needed to bring a destination's *head* up to date.
///
/// The head's own contribution is its delta (ranges written since the
/// newest clone). Everything older is attributed to clones, newest first;
/// a range re-covered by a newer clone is never resent via an older one.
/// Clones the destination already holds contribute nothing to the plan.
pub fn compute_head_subset(
    membership: &SnapshotMembership,
    missing: &MissingSet,
    head: &ObjectId,
) -> SubsetPlan {
    filter_to_missing(attribute_sources(membership, head), missing)
}

/// Computes the subsets needed to reconstruct a single *clone* on the
/// destination: the clone's own delta, plus the deltas of older missing
/// clones it depends on, with the same newest-to-oldest subtraction.
///
/// An unknown clone yields an empty plan: nothing is known to move.
pub fn compute_clone_subset(
    membership: &SnapshotMembership,
    object: &ObjectId,
    missing: &MissingSet,
) -> SubsetPlan {
    filter_to_missing(attribute_sources(membership, object), missing)
}

fn filter_to_missing(attribution: SourceAttribution, missing: &MissingSet) -> SubsetPlan {
    let mut plan = SubsetPlan {
        data_subset: attribution.own,
        clone_subsets: BTreeMap::new(),
    };
    for (clone_id, ranges) in attribution.clone_sources {
        if missing.is_missing(&clone_id) {
            plan.clone_subsets.insert(clone_id, ranges);
        }
    }
    plan
}
