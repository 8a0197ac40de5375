//! Host collaborators and the settings records exchanged with them.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use scanmap_core::{MarkerObservation, MarkerRecord};
use scanmap_export::LiveMesh;
use serde::{Deserialize, Serialize};

/// Detector tuning preset exposed by the host's marker subsystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorProfile {
    #[default]
    Default,
    Speed,
    Accuracy,
    SmallTargets,
    Large,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    #[default]
    Aruco,
    AprilTag,
    Qr,
}

/// Settings record passed to [`MarkerSource::create_detector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerDetectorSettings {
    #[serde(default)]
    pub profile: DetectorProfile,
    #[serde(default)]
    pub marker_type: MarkerType,
    /// Let the detector estimate the physical marker side length.
    #[serde(default = "default_true")]
    pub estimate_length: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MarkerDetectorSettings {
    fn default() -> Self {
        Self {
            profile: DetectorProfile::Default,
            marker_type: MarkerType::Aruco,
            estimate_length: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshRenderMode {
    #[default]
    Triangles,
    PointCloud,
}

/// Optional work requested from the meshing subsystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDetectorFlags {
    pub compute_normals: bool,
    pub compute_confidence: bool,
    pub planarize: bool,
    pub remove_mesh_skirt: bool,
}

/// Meshing query volume and quality.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshQuerySettings {
    pub bounds_origin: Vector3<f32>,
    /// Euler angles in degrees (roll, pitch, yaw).
    pub bounds_rotation: Vector3<f32>,
    pub bounds_scale: Vector3<f32>,
    /// Mesh density in `[0, 1]`.
    pub density: f32,
    pub render_mode: MeshRenderMode,
    pub flags: MeshDetectorFlags,
}

impl Default for MeshQuerySettings {
    fn default() -> Self {
        Self {
            bounds_origin: Vector3::zeros(),
            bounds_rotation: Vector3::zeros(),
            bounds_scale: Vector3::new(10.0, 10.0, 10.0),
            density: 1.0,
            render_mode: MeshRenderMode::Triangles,
            flags: MeshDetectorFlags::default(),
        }
    }
}

impl MeshQuerySettings {
    /// Pose of the query volume in the host frame.
    pub fn bounds_isometry(&self) -> Isometry3<f32> {
        let r = self.bounds_rotation.map(f32::to_radians);
        Isometry3::from_parts(
            Translation3::from(self.bounds_origin),
            UnitQuaternion::from_euler_angles(r.x, r.y, r.z),
        )
    }
}

/// Capabilities requested from the host's permission gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    SpatialMapping,
}

impl Permission {
    pub fn name(self) -> &'static str {
        match self {
            Permission::SpatialMapping => "SPATIAL_MAPPING",
        }
    }
}

/// Asynchronous answer to [`SessionHost::request_permission`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted(Permission),
    Denied(Permission),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("marker detector could not be created: {0}")]
    DetectorCreation(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("no input action source available for the export trigger")]
    NoInputSource,
    #[error("input action '{0}' not found")]
    MissingAction(String),
}

/// Presentation object for one marker record, owned by the session.
#[derive(Debug, PartialEq, Eq)]
pub struct VisualHandle {
    pub id: u64,
    pub marker: u64,
}

/// The host's marker-understanding subsystem.
pub trait MarkerSource {
    fn create_detector(&mut self, settings: &MarkerDetectorSettings) -> Result<(), SourceError>;
    /// Latest observation batch of the active detector.
    fn poll_batch(&mut self) -> Vec<MarkerObservation>;
    fn destroy_all_detectors(&mut self);
}

/// The host's meshing subsystem.
pub trait MeshSource: LiveMesh {
    /// Apply query volume, density, render mode, and detector flags, and
    /// invalidate meshes built under the previous settings.
    fn apply_query_settings(&mut self, settings: &MeshQuerySettings);
    fn destroy_all_meshes(&mut self);
}

/// Host runtime services: XR readiness, capabilities, input, permissions.
pub trait SessionHost {
    /// True once the XR meshing subsystem is loaded.
    fn subsystems_loaded(&self) -> bool;
    fn meshing_feature_enabled(&self) -> bool;
    fn bind_export_trigger(&mut self) -> Result<(), BindingError>;
    fn unbind_export_trigger(&mut self);
    /// Fire the prompt; the answer arrives via
    /// [`crate::DetectionSession::on_permission`].
    fn request_permission(&mut self, permission: Permission);
}

/// Creates and destroys marker visuals.
pub trait MarkerVisuals {
    fn spawn(&mut self, record: &MarkerRecord, label: &str) -> VisualHandle;
    fn despawn(&mut self, handle: VisualHandle);
}
