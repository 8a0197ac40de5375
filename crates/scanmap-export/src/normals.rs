//! Normal recomputation from a triangulation.

use nalgebra::{Point3, Vector3};

/// Unnormalized face normal of a counter-clockwise triangle.
///
/// Its length is twice the triangle area, which makes summing these an
/// area-weighted average.
#[inline]
pub fn face_normal(a: &Point3<f32>, b: &Point3<f32>, c: &Point3<f32>) -> Vector3<f32> {
    (b - a).cross(&(c - a))
}

/// Per-vertex normals: area-weighted average of incident face normals.
///
/// Triangles with out-of-range indices are ignored. Vertices without any
/// non-degenerate incident face get a zero vector.
pub fn vertex_normals(positions: &[Point3<f32>], triangles: &[[u32; 3]]) -> Vec<Vector3<f32>> {
    let mut acc = vec![Vector3::zeros(); positions.len()];
    let n = positions.len();

    for &[a, b, c] in triangles {
        let (a, b, c) = (a as usize, b as usize, c as usize);
        if a >= n || b >= n || c >= n {
            continue;
        }
        let face = face_normal(&positions[a], &positions[b], &positions[c]);
        acc[a] += face;
        acc[b] += face;
        acc[c] += face;
    }

    for v in &mut acc {
        *v = v.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros);
    }
    acc
}
