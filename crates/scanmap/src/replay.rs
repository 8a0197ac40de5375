//! Offline replay of recorded observation batches.
//!
//! A recording is `{"batches": [[observation, ...], ...]}`, one inner array
//! per tick, with observations in the same camelCase form the host reports.

use std::fs;
use std::path::Path;

use log::info;
use scanmap_core::MarkerObservation;
use scanmap_registry::{FusionPolicy, FusionPolicyError, MarkerRegistry};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Policy(#[from] FusionPolicyError),
}

/// Observation batches captured from a live session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObservationLog {
    pub batches: Vec<Vec<MarkerObservation>>,
}

impl ObservationLog {
    /// Load a JSON recording from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this recording to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Totals over a replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub batches: usize,
    /// Batches that would have triggered a visual rebuild.
    pub changed_batches: usize,
    pub inserted: usize,
    pub replaced: usize,
    pub dropped: usize,
}

/// Fuse every batch of `log`, in order, into a fresh registry.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(log), fields(batches = log.batches.len()))
)]
pub fn replay(
    log: &ObservationLog,
    policy: FusionPolicy,
) -> Result<(MarkerRegistry, ReplaySummary), ReplayError> {
    let mut registry = MarkerRegistry::with_policy(policy)?;
    let mut summary = ReplaySummary::default();

    for batch in &log.batches {
        let out = registry.fuse_detailed(batch);
        summary.batches += 1;
        summary.inserted += out.inserted;
        summary.replaced += out.replaced;
        summary.dropped += out.dropped;
        if out.changed {
            summary.changed_batches += 1;
        }
    }

    info!(
        "replayed {} batches: {} markers, {} replacements, {} dropped",
        summary.batches,
        registry.len(),
        summary.replaced,
        summary.dropped
    );
    Ok((registry, summary))
}
