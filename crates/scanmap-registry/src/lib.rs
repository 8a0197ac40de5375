//! Fused registry of fiducial markers observed during a scanning session.
//!
//! Each tick the host reports a batch of noisy, partial marker observations.
//! [`MarkerRegistry::fuse`] keeps at most one record per marker number and
//! decides, under a [`FusionPolicy`], whether a new observation overwrites
//! the stored estimate.
//!
//! The default policy reproduces the reference behavior exactly:
//! - first valid sighting of a number inserts it and reports a change,
//! - a later sighting replaces the record only when its reprojection error is
//!   strictly *larger* and its position lies within 1 cm of the stored one,
//! - such a replacement is not reported as a change
//!   ([`ChangeReporting::InsertsOnly`]).
//!
//! Records are never removed.

mod policy;
mod registry;

pub use policy::{ChangeReporting, FusionPolicy, FusionPolicyError, DEFAULT_REPLACE_TOLERANCE_M};
pub use registry::{FuseOutcome, MarkerRegistry};
