use std::collections::btree_map::{BTreeMap, Entry};

use log::{debug, trace};
use scanmap_core::{MarkerObservation, MarkerRecord, Pose};

use crate::policy::{FusionPolicy, FusionPolicyError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-batch counters returned by [`MarkerRegistry::fuse_detailed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FuseOutcome {
    /// New numbers added to the registry.
    pub inserted: usize,
    /// Existing records overwritten in place.
    pub replaced: usize,
    /// Observations discarded for a missing number or placeholder pose.
    pub dropped: usize,
    /// Usable observations that left the stored record untouched.
    pub kept: usize,
    /// Whether the batch counts as a change under the active policy.
    pub changed: bool,
}

/// Set of known markers, keyed by marker number.
#[derive(Clone, Debug, Default)]
pub struct MarkerRegistry {
    policy: FusionPolicy,
    records: BTreeMap<u64, MarkerRecord>,
}

impl MarkerRegistry {
    /// Empty registry with the reference policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry with a validated custom policy.
    pub fn with_policy(policy: FusionPolicy) -> Result<Self, FusionPolicyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            records: BTreeMap::new(),
        })
    }

    #[inline]
    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    /// Fuse one tick's observations; returns whether the registry changed.
    pub fn fuse(&mut self, batch: &[MarkerObservation]) -> bool {
        self.fuse_detailed(batch).changed
    }

    /// Same as [`MarkerRegistry::fuse`], with per-batch counters.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, batch), fields(batch = batch.len()))
    )]
    pub fn fuse_detailed(&mut self, batch: &[MarkerObservation]) -> FuseOutcome {
        let mut out = FuseOutcome::default();

        for obs in batch {
            let Some((number, pose)) = obs.usable() else {
                trace!("dropping unusable observation {:?}", obs.number);
                out.dropped += 1;
                continue;
            };

            match self.records.entry(number) {
                Entry::Vacant(slot) => {
                    slot.insert(MarkerRecord::new(number, pose, obs.reprojection_error));
                    out.inserted += 1;
                }
                Entry::Occupied(mut slot) => {
                    let stored = slot.get_mut();
                    if should_replace(&self.policy, stored, &pose, obs.reprojection_error) {
                        *stored = MarkerRecord::new(number, pose, obs.reprojection_error);
                        out.replaced += 1;
                    } else {
                        out.kept += 1;
                    }
                }
            }
        }

        out.changed = out.inserted > 0 || (self.policy.reports_replacements() && out.replaced > 0);
        if out.inserted > 0 || out.replaced > 0 {
            debug!(
                "fused batch: inserted={} replaced={} kept={} dropped={} total={}",
                out.inserted,
                out.replaced,
                out.kept,
                out.dropped,
                self.records.len()
            );
        }
        out
    }

    pub fn get(&self, number: u64) -> Option<&MarkerRecord> {
        self.records.get(&number)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending marker-number order.
    pub fn records(&self) -> impl Iterator<Item = &MarkerRecord> + '_ {
        self.records.values()
    }

    /// Copy of all records at this instant.
    pub fn snapshot(&self) -> Vec<MarkerRecord> {
        self.records.values().copied().collect()
    }
}

/// Ratchet rule: only a strictly worse error at (nearly) the same spot wins.
fn should_replace(policy: &FusionPolicy, stored: &MarkerRecord, pose: &Pose, error: f32) -> bool {
    stored.reprojection_error < error && stored.pose.distance_to(pose) < policy.replace_tolerance_m
}
