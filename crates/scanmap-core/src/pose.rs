//! Rigid pose of a marker in world space.

use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};

/// Position + orientation in the host's world frame (meters).
///
/// Serialized as `{"position":{x,y,z},"rotation":{x,y,z,w}}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PoseRepr", into = "PoseRepr")]
pub struct Pose {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Pose {
    pub fn new(position: Point3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    /// Pose at `(x, y, z)` with identity rotation.
    pub fn from_position(x: f32, y: f32, z: f32) -> Self {
        Self::new(Point3::new(x, y, z), UnitQuaternion::identity())
    }

    /// True for the placeholder poses hosts report when no real estimate
    /// exists: a position exactly at the origin, or a non-finite one.
    pub fn is_placeholder(&self) -> bool {
        let p = &self.position;
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return true;
        }
        p.x == 0.0 && p.y == 0.0 && p.z == 0.0
    }

    /// Euclidean distance between the two positions.
    #[inline]
    pub fn distance_to(&self, other: &Pose) -> f32 {
        nalgebra::distance(&self.position, &other.position)
    }

    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position.coords), self.rotation)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(Point3::origin(), UnitQuaternion::identity())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct Vec3Repr {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct QuatRepr {
    x: f32,
    y: f32,
    z: f32,
    w: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct PoseRepr {
    position: Vec3Repr,
    rotation: QuatRepr,
}

impl From<PoseRepr> for Pose {
    fn from(repr: PoseRepr) -> Self {
        let Vec3Repr { x, y, z } = repr.position;
        let q = repr.rotation;
        // All-zero quaternions come from default-initialized host structs.
        let rotation = UnitQuaternion::try_new(Quaternion::new(q.w, q.x, q.y, q.z), f32::EPSILON)
            .unwrap_or_else(UnitQuaternion::identity);
        Self::new(Point3::new(x, y, z), rotation)
    }
}

impl From<Pose> for PoseRepr {
    fn from(pose: Pose) -> Self {
        let q = pose.rotation.quaternion();
        Self {
            position: Vec3Repr {
                x: pose.position.x,
                y: pose.position.y,
                z: pose.position.z,
            },
            rotation: QuatRepr {
                x: q.i,
                y: q.j,
                z: q.k,
                w: q.w,
            },
        }
    }
}
