use serde::{Deserialize, Serialize};

/// Positional tolerance for the replace rule, in meters.
pub const DEFAULT_REPLACE_TOLERANCE_M: f32 = 0.01;

/// Which fusion events count as a registry change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReporting {
    /// Only first sightings are reported. In-place replacements update the
    /// record silently, so visuals built from the old values go stale until
    /// the next insert.
    #[default]
    InsertsOnly,
    /// Inserts and in-place replacements are both reported.
    InsertsAndReplacements,
}

/// Rule set applied by [`crate::MarkerRegistry::fuse`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FusionPolicy {
    /// A replacement is only considered when the new position is strictly
    /// closer than this to the stored one.
    #[serde(default = "default_tolerance")]
    pub replace_tolerance_m: f32,
    #[serde(default)]
    pub change_reporting: ChangeReporting,
}

fn default_tolerance() -> f32 {
    DEFAULT_REPLACE_TOLERANCE_M
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            replace_tolerance_m: DEFAULT_REPLACE_TOLERANCE_M,
            change_reporting: ChangeReporting::default(),
        }
    }
}

/// Policy validation errors.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FusionPolicyError {
    #[error("replace tolerance must be finite and >= 0 (got {0})")]
    InvalidTolerance(f32),
}

impl FusionPolicy {
    /// Default policy with both inserts and replacements reported.
    pub fn reporting_replacements() -> Self {
        Self {
            change_reporting: ChangeReporting::InsertsAndReplacements,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FusionPolicyError> {
        if !self.replace_tolerance_m.is_finite() || self.replace_tolerance_m < 0.0 {
            return Err(FusionPolicyError::InvalidTolerance(self.replace_tolerance_m));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn reports_replacements(&self) -> bool {
        self.change_reporting == ChangeReporting::InsertsAndReplacements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_reference_policy() {
        let policy: FusionPolicy = serde_json::from_str("{}").expect("policy");
        assert_eq!(policy, FusionPolicy::default());
        assert_eq!(policy.change_reporting, ChangeReporting::InsertsOnly);
    }

    #[test]
    fn change_reporting_uses_snake_case() {
        let policy: FusionPolicy =
            serde_json::from_str(r#"{"change_reporting":"inserts_and_replacements"}"#)
                .expect("policy");
        assert!(policy.reports_replacements());
    }

    #[test]
    fn rejects_negative_or_nan_tolerance() {
        let mut policy = FusionPolicy::default();
        assert!(policy.validate().is_ok());
        policy.replace_tolerance_m = -0.5;
        assert_eq!(
            policy.validate(),
            Err(FusionPolicyError::InvalidTolerance(-0.5))
        );
        policy.replace_tolerance_m = f32::NAN;
        assert!(policy.validate().is_err());
    }
}
