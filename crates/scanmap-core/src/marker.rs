//! Marker observations (per tick) and fused marker records.

use serde::{Deserialize, Serialize};

use crate::Pose;

/// One marker detection reported by the host for a single tick.
///
/// Hosts routinely report partial detections, so both the number and the
/// pose are optional. Use [`MarkerObservation::usable`] to filter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerObservation {
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub pose: Option<Pose>,
    /// Reprojection error in meters; lower is better.
    #[serde(default)]
    pub reprojection_error: f32,
}

impl MarkerObservation {
    /// A complete observation.
    pub fn new(number: u64, pose: Pose, reprojection_error: f32) -> Self {
        Self {
            number: Some(number),
            pose: Some(pose),
            reprojection_error,
        }
    }

    /// Number and pose, if this observation can be fused.
    ///
    /// Requires a number, a non-placeholder pose and a finite,
    /// non-negative reprojection error.
    pub fn usable(&self) -> Option<(u64, Pose)> {
        let err = self.reprojection_error;
        if !err.is_finite() || err < 0.0 {
            return None;
        }
        let number = self.number?;
        let pose = self.pose.filter(|p| !p.is_placeholder())?;
        Some((number, pose))
    }
}

/// The registry's best estimate for one physical marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRecord {
    pub number: u64,
    pub pose: Pose,
    pub reprojection_error: f32,
}

impl MarkerRecord {
    pub fn new(number: u64, pose: Pose, reprojection_error: f32) -> Self {
        Self {
            number,
            pose,
            reprojection_error,
        }
    }
}
