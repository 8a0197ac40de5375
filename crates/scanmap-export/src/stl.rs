//! Binary STL container.
//!
//! Layout: 80-byte header, little-endian `u32` facet count, then 50 bytes per
//! facet (normal, three vertices as `f32` triples, `u16` attribute).

use std::io::{self, Read, Write};

use log::warn;
use nalgebra::{Point3, Vector3};
use scanmap_core::MeshSurface;

use crate::normals::vertex_normals;

pub const STL_HEADER_BYTES: usize = 80;
pub const STL_FACET_BYTES: usize = 50;
const STL_PREAMBLE_BYTES: usize = STL_HEADER_BYTES + 4;

#[derive(thiserror::Error, Debug)]
pub enum StlError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("stl data too short for a header ({len} bytes)")]
    TooShort { len: usize },
    #[error("stl declares {declared} facets ({expected} bytes) but has {actual} bytes")]
    LengthMismatch {
        declared: u32,
        expected: usize,
        actual: usize,
    },
    #[error("too many facets for binary stl ({0})")]
    TooManyFacets(usize),
}

/// One triangle with its facet normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StlFacet {
    pub normal: Vector3<f32>,
    pub vertices: [Point3<f32>; 3],
}

/// In-memory binary STL.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StlMesh {
    pub header: String,
    pub facets: Vec<StlFacet>,
}

impl StlMesh {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            facets: Vec::new(),
        }
    }

    /// Append every triangle of `surface` in world space.
    ///
    /// Normals are recomputed from the world-space triangulation; each facet
    /// normal is the normalized mean of its three vertex normals. Triangles
    /// with out-of-range indices are skipped; the skip count is returned.
    pub fn append_surface(&mut self, surface: &MeshSurface) -> usize {
        let world: Vec<Point3<f32>> = (0..surface.vertices.len())
            .filter_map(|i| surface.world_vertex(i))
            .collect();
        let normals = vertex_normals(&world, &surface.triangles);

        let mut skipped = 0;
        self.facets.reserve(surface.triangle_count());
        for tri in 0..surface.triangle_count() {
            let Some([a, b, c]) = surface.triangle_indices(tri) else {
                skipped += 1;
                continue;
            };
            let mean = (normals[a] + normals[b] + normals[c]) / 3.0;
            self.facets.push(StlFacet {
                normal: mean.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros),
                vertices: [world[a], world[b], world[c]],
            });
        }
        if skipped > 0 {
            warn!(
                "surface '{}': skipped {skipped} triangles with out-of-range indices",
                surface.name
            );
        }
        skipped
    }

    #[inline]
    pub fn facet_count(&self) -> usize {
        self.facets.len()
    }

    /// Size of the encoded container in bytes.
    pub fn encoded_len(&self) -> usize {
        STL_PREAMBLE_BYTES + STL_FACET_BYTES * self.facets.len()
    }

    /// Encode as binary STL.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), StlError> {
        let count = u32::try_from(self.facets.len())
            .map_err(|_| StlError::TooManyFacets(self.facets.len()))?;

        let mut header = [0u8; STL_HEADER_BYTES];
        let raw = self.header.as_bytes();
        let n = raw.len().min(STL_HEADER_BYTES);
        header[..n].copy_from_slice(&raw[..n]);
        w.write_all(&header)?;
        w.write_all(&count.to_le_bytes())?;

        let mut buf = [0u8; STL_FACET_BYTES];
        for facet in &self.facets {
            let mut off = 0;
            let mut put = |v: f32| {
                buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
                off += 4;
            };
            put(facet.normal.x);
            put(facet.normal.y);
            put(facet.normal.z);
            for v in &facet.vertices {
                put(v.x);
                put(v.y);
                put(v.z);
            }
            buf[48..50].copy_from_slice(&0u16.to_le_bytes());
            w.write_all(&buf)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Decode a binary STL, checking the declared facet count against the
    /// payload length.
    pub fn read_from<R: Read>(mut r: R) -> Result<Self, StlError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StlError> {
        if data.len() < STL_PREAMBLE_BYTES {
            return Err(StlError::TooShort { len: data.len() });
        }
        let declared = read_u32(&data[STL_HEADER_BYTES..STL_PREAMBLE_BYTES]);
        let expected = STL_PREAMBLE_BYTES + STL_FACET_BYTES * declared as usize;
        if data.len() != expected {
            return Err(StlError::LengthMismatch {
                declared,
                expected,
                actual: data.len(),
            });
        }

        let header_raw = &data[..STL_HEADER_BYTES];
        let end = header_raw.iter().position(|&b| b == 0).unwrap_or(STL_HEADER_BYTES);
        let header = String::from_utf8_lossy(&header_raw[..end]).trim_end().to_string();

        let facets = data[STL_PREAMBLE_BYTES..]
            .chunks_exact(STL_FACET_BYTES)
            .map(|chunk| {
                let f = |i: usize| read_f32(&chunk[i * 4..i * 4 + 4]);
                StlFacet {
                    normal: Vector3::new(f(0), f(1), f(2)),
                    vertices: [
                        Point3::new(f(3), f(4), f(5)),
                        Point3::new(f(6), f(7), f(8)),
                        Point3::new(f(9), f(10), f(11)),
                    ],
                }
            })
            .collect();

        Ok(Self { header, facets })
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn read_f32(b: &[u8]) -> f32 {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
