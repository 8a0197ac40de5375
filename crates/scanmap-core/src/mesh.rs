//! Host mesh surfaces as seen by the exporter.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One triangulated surface held by the host's meshing subsystem.
///
/// Vertices are in the surface's local frame. `scale` is applied first, then
/// `transform`, to obtain world coordinates. Triangles use counter-clockwise
/// winding for the outward side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshSurface {
    pub name: String,
    pub vertices: Vec<Point3<f32>>,
    pub triangles: Vec<[u32; 3]>,
    #[serde(default = "identity_transform")]
    pub transform: Isometry3<f32>,
    #[serde(default = "unit_scale")]
    pub scale: Vector3<f32>,
}

fn identity_transform() -> Isometry3<f32> {
    Isometry3::identity()
}

fn unit_scale() -> Vector3<f32> {
    Vector3::new(1.0, 1.0, 1.0)
}

impl MeshSurface {
    /// A surface placed at the world origin with unit scale.
    pub fn new(name: impl Into<String>, vertices: Vec<Point3<f32>>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            name: name.into(),
            vertices,
            triangles,
            transform: identity_transform(),
            scale: unit_scale(),
        }
    }

    pub fn with_transform(mut self, transform: Isometry3<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Local vertex `idx` mapped to world space.
    pub fn world_vertex(&self, idx: usize) -> Option<Point3<f32>> {
        let v = self.vertices.get(idx)?;
        let scaled = Point3::from(v.coords.component_mul(&self.scale));
        Some(self.transform.transform_point(&scaled))
    }

    /// Triangle vertex indices, or `None` if any index is out of range.
    pub fn triangle_indices(&self, tri: usize) -> Option<[usize; 3]> {
        let [a, b, c] = *self.triangles.get(tri)?;
        let n = self.vertices.len();
        let idx = [a as usize, b as usize, c as usize];
        idx.iter().all(|&i| i < n).then_some(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn world_vertex_applies_scale_then_transform() {
        let surface = MeshSurface::new("s", vec![Point3::new(1.0, 0.0, 0.0)], vec![])
            .with_scale(Vector3::new(2.0, 1.0, 1.0))
            .with_transform(Isometry3::from_parts(
                Translation3::new(0.0, 0.0, 5.0),
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
            ));

        let w = surface.world_vertex(0).expect("vertex");
        assert_relative_eq!(w.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(w.y, 2.0, epsilon = 1e-6);
        assert_relative_eq!(w.z, 5.0, epsilon = 1e-6);
        assert!(surface.world_vertex(1).is_none());
    }

    #[test]
    fn out_of_range_triangle_is_rejected() {
        let surface = MeshSurface::new(
            "s",
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2], [0, 1, 9]],
        );
        assert_eq!(surface.triangle_indices(0), Some([0, 1, 2]));
        assert_eq!(surface.triangle_indices(1), None);
    }
}
