//! Mesh anchor decoding and per-vertex normal estimation.
//!
//! A mesh anchor is a surface patch in its own local frame. Its raw buffers
//! are decoded into typed vertices and triangles, and vertex normals are
//! accumulated from the unit normals of the faces that touch each vertex.

use glam::{Mat3, Mat4, Vec3};
use thiserror::Error;
use tracing::{debug, warn};

/// Squared length below which an accumulated normal stays undefined.
const NORMAL_EPSILON_SQ: f32 = 1e-12;

/// Errors produced while decoding raw anchor buffers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Unsupported index width: {0} bytes (expected 2 or 4)")]
    UnsupportedIndexWidth(usize),

    #[error("Vertex stride {0} is smaller than a packed float3")]
    InvalidStride(usize),

    #[error("Primitives need at least 3 indices, got {0}")]
    InvalidPrimitive(usize),

    #[error("{buffer} buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort {
        buffer: &'static str,
        needed: usize,
        actual: usize,
    },
}

/// Layout of float3 positions inside a raw vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    /// Byte distance between consecutive vertices.
    pub stride: usize,
    /// Byte offset of the first position.
    pub offset: usize,
    /// Number of vertices.
    pub count: usize,
}

impl VertexLayout {
    /// Tightly packed float3 positions.
    pub fn packed(count: usize) -> Self {
        Self {
            stride: 12,
            offset: 0,
            count,
        }
    }
}

/// Layout of a raw index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLayout {
    /// 2 (u16) or 4 (u32).
    pub bytes_per_index: usize,
    /// Usually 3.
    pub indices_per_primitive: usize,
    /// Number of primitives.
    pub primitive_count: usize,
}

/// Vertices and normals of one anchor, in anchor-local space.
#[derive(Debug, Clone, Default)]
pub struct AnchorGeometry {
    pub vertices: Vec<Vec3>,
    /// Same length as `vertices`; `Vec3::ZERO` where undefined.
    pub normals: Vec<Vec3>,
    /// Triangles dropped because an index was out of range.
    pub skipped_triangles: usize,
}

impl AnchorGeometry {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// One reconstructed surface patch.
#[derive(Debug, Clone)]
pub struct MeshAnchor {
    pub id: String,
    pub timestamp: f64,
    /// Local to world transform (column-major).
    pub transform: Mat4,
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshAnchor {
    pub fn new(
        id: impl Into<String>,
        timestamp: f64,
        transform: Mat4,
        vertices: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            transform,
            vertices,
            triangles,
        }
    }

    /// Decode an anchor from raw little-endian vertex and index buffers.
    ///
    /// Primitives with more than three indices are fan-triangulated.
    pub fn from_raw(
        id: impl Into<String>,
        timestamp: f64,
        transform: Mat4,
        vertex_bytes: &[u8],
        vertex_layout: VertexLayout,
        index_bytes: &[u8],
        index_layout: IndexLayout,
    ) -> Result<Self, GeometryError> {
        let vertices = decode_vertices(vertex_bytes, vertex_layout)?;
        let triangles = decode_triangles(index_bytes, index_layout)?;
        Ok(Self::new(id, timestamp, transform, vertices, triangles))
    }

    /// Decode local vertices and compute per-vertex normals.
    pub fn extract(&self) -> AnchorGeometry {
        let (normals, skipped_triangles) = vertex_normals(&self.vertices, &self.triangles);
        if skipped_triangles > 0 {
            warn!(
                "Anchor {}: skipped {} malformed triangles",
                self.id, skipped_triangles
            );
        }
        AnchorGeometry {
            vertices: self.vertices.clone(),
            normals,
            skipped_triangles,
        }
    }

    /// Transform an anchor-local point to world space.
    pub fn point_to_world(&self, local: Vec3) -> Vec3 {
        self.transform.transform_point3(local)
    }

    /// Transform an anchor-local normal to world space.
    ///
    /// Uses the inverse transpose of the linear part so non-uniform scale is
    /// handled; undefined normals stay undefined.
    pub fn normal_to_world(&self, local: Vec3) -> Vec3 {
        if local.length_squared() == 0.0 {
            return Vec3::ZERO;
        }
        let linear = Mat3::from_mat4(self.transform);
        let det = linear.determinant();
        let normal_matrix = if det.abs() > f32::EPSILON {
            linear.inverse().transpose()
        } else {
            linear
        };
        (normal_matrix * local).normalize_or_zero()
    }
}

fn decode_vertices(bytes: &[u8], layout: VertexLayout) -> Result<Vec<Vec3>, GeometryError> {
    if layout.stride < 12 {
        return Err(GeometryError::InvalidStride(layout.stride));
    }
    if layout.count == 0 {
        return Ok(Vec::new());
    }
    let needed = (layout.count - 1)
        .checked_mul(layout.stride)
        .and_then(|n| n.checked_add(layout.offset))
        .and_then(|n| n.checked_add(12))
        .unwrap_or(usize::MAX);
    if bytes.len() < needed {
        return Err(GeometryError::BufferTooShort {
            buffer: "vertex",
            needed,
            actual: bytes.len(),
        });
    }

    let read_f32 = |at: usize| f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let vertices = (0..layout.count)
        .map(|i| {
            let base = layout.offset + i * layout.stride;
            Vec3::new(read_f32(base), read_f32(base + 4), read_f32(base + 8))
        })
        .collect();
    Ok(vertices)
}

fn decode_triangles(bytes: &[u8], layout: IndexLayout) -> Result<Vec<[u32; 3]>, GeometryError> {
    if layout.bytes_per_index != 2 && layout.bytes_per_index != 4 {
        return Err(GeometryError::UnsupportedIndexWidth(layout.bytes_per_index));
    }
    if layout.indices_per_primitive < 3 {
        return Err(GeometryError::InvalidPrimitive(layout.indices_per_primitive));
    }
    let needed = layout
        .primitive_count
        .checked_mul(layout.indices_per_primitive)
        .and_then(|n| n.checked_mul(layout.bytes_per_index))
        .unwrap_or(usize::MAX);
    if bytes.len() < needed {
        return Err(GeometryError::BufferTooShort {
            buffer: "index",
            needed,
            actual: bytes.len(),
        });
    }

    let indices: Vec<u32> = match layout.bytes_per_index {
        2 => bytes[..needed]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
            .collect(),
        _ => bytes[..needed]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    };

    let mut triangles =
        Vec::with_capacity(layout.primitive_count * (layout.indices_per_primitive - 2));
    for primitive in indices.chunks_exact(layout.indices_per_primitive) {
        for i in 1..primitive.len() - 1 {
            triangles.push([primitive[0], primitive[i], primitive[i + 1]]);
        }
    }
    Ok(triangles)
}

/// Compute per-vertex normals by summing unit face normals.
///
/// Returns the normals (same length as `vertices`) and the number of
/// triangles skipped because an index was out of range. Degenerate faces
/// contribute nothing; vertices with no usable contribution get `Vec3::ZERO`.
pub fn vertex_normals(vertices: &[Vec3], triangles: &[[u32; 3]]) -> (Vec<Vec3>, usize) {
    let mut accum = vec![Vec3::ZERO; vertices.len()];
    let mut skipped = 0;
    let mut degenerate = 0;

    for &[a, b, c] in triangles {
        let (a, b, c) = (a as usize, b as usize, c as usize);
        if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
            skipped += 1;
            continue;
        }
        let (v0, v1, v2) = (vertices[a], vertices[b], vertices[c]);
        let cross = (v1 - v0).cross(v2 - v0);
        if cross.length_squared() < NORMAL_EPSILON_SQ {
            degenerate += 1;
            continue;
        }
        let face_normal = cross.normalize();
        accum[a] += face_normal;
        accum[b] += face_normal;
        accum[c] += face_normal;
    }

    if degenerate > 0 {
        debug!("{} degenerate faces contributed no normal", degenerate);
    }

    let normals = accum
        .into_iter()
        .map(|n| {
            if n.length_squared() < NORMAL_EPSILON_SQ {
                Vec3::ZERO
            } else {
                n.normalize()
            }
        })
        .collect();
    (normals, skipped)
}
