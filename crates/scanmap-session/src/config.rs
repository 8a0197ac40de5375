//! Session configuration and its JSON helpers.

use std::fs;
use std::path::Path;

use scanmap_export::ExportConfig;
use scanmap_registry::{FusionPolicy, FusionPolicyError};
use serde::{Deserialize, Serialize};

use crate::host::{MarkerDetectorSettings, MeshQuerySettings};

#[derive(thiserror::Error, Debug)]
pub enum SessionIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Fusion(#[from] FusionPolicyError),
    #[error("mesh density must be in [0, 1] (got {0})")]
    InvalidDensity(f32),
    #[error("mesh bounds scale must be finite and > 0 (got {0:?})")]
    InvalidBoundsScale([f32; 3]),
    #[error("mesh bounds origin and rotation must be finite")]
    NonFiniteBounds,
    #[error("export base path is empty")]
    EmptyBasePath,
    #[error("readiness timeout must be at least one tick")]
    ZeroReadinessTimeout,
}

fn default_export() -> ExportConfig {
    ExportConfig::new("scanmap_snapshot")
}

/// Everything a [`crate::DetectionSession`] needs, passed in at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub detector: MarkerDetectorSettings,
    /// Applied once the spatial-mapping permission is granted.
    #[serde(default)]
    pub mesh: MeshQuerySettings,
    #[serde(default)]
    pub fusion: FusionPolicy,
    #[serde(default = "default_export")]
    pub export: ExportConfig,
    /// Give up waiting for the XR subsystem after this many ticks.
    /// `None` waits forever.
    #[serde(default)]
    pub readiness_timeout_ticks: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detector: MarkerDetectorSettings::default(),
            mesh: MeshQuerySettings::default(),
            fusion: FusionPolicy::default(),
            export: default_export(),
            readiness_timeout_ticks: None,
        }
    }
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SessionIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SessionIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;

        let mesh = &self.mesh;
        if !mesh.density.is_finite() || !(0.0..=1.0).contains(&mesh.density) {
            return Err(ConfigError::InvalidDensity(mesh.density));
        }
        if mesh.bounds_scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            let s = mesh.bounds_scale;
            return Err(ConfigError::InvalidBoundsScale([s.x, s.y, s.z]));
        }
        if mesh
            .bounds_origin
            .iter()
            .chain(mesh.bounds_rotation.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ConfigError::NonFiniteBounds);
        }
        if self.export.base_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyBasePath);
        }
        if self.readiness_timeout_ticks == Some(0) {
            return Err(ConfigError::ZeroReadinessTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use std::path::PathBuf;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: SessionConfig = serde_json::from_str(
            r#"{"export":{"base_path":"maps/lab"},"mesh":{"density":0.25}}"#,
        )
        .expect("config");
        assert_eq!(cfg.export.base_path, PathBuf::from("maps/lab"));
        assert_eq!(cfg.mesh.density, 0.25);
        assert_eq!(cfg.mesh.bounds_scale, Vector3::new(10.0, 10.0, 10.0));
        assert_eq!(cfg.readiness_timeout_ticks, None);
        assert!(cfg.detector.estimate_length);
    }

    #[test]
    fn rejects_bad_mesh_settings() {
        let mut cfg = SessionConfig::default();
        cfg.mesh.density = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidDensity(1.5)));

        let mut cfg = SessionConfig::default();
        cfg.mesh.bounds_scale = Vector3::new(1.0, 0.0, 1.0);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidBoundsScale([1.0, 0.0, 1.0]))
        );

        let mut cfg = SessionConfig::default();
        cfg.mesh.bounds_rotation.y = f32::NAN;
        assert_eq!(cfg.validate(), Err(ConfigError::NonFiniteBounds));
    }

    #[test]
    fn rejects_empty_path_and_zero_timeout() {
        let mut cfg = SessionConfig::default();
        cfg.export.base_path = PathBuf::new();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyBasePath));

        let mut cfg = SessionConfig::default();
        cfg.readiness_timeout_ticks = Some(0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroReadinessTimeout));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let mut cfg = SessionConfig::default();
        cfg.readiness_timeout_ticks = Some(600);
        cfg.mesh.flags.compute_normals = true;
        cfg.write_json(&path).expect("write");
        assert_eq!(SessionConfig::load_json(&path).expect("load"), cfg);
    }
}
