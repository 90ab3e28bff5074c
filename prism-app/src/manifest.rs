//! JSON scan snapshots: mesh anchors and posed frames on disk.
//!
//! ```json
//! {
//!   "anchors": [
//!     { "id": "a0", "timestamp": 0.0, "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
//!       "vertices": [[0,0,0], [1,0,0], [0,1,0]], "indices": [[0,1,2]] }
//!   ],
//!   "frames": [
//!     { "image": "frames/0001.jpg", "transform": [...], "timestamp": 0.1,
//!       "intrinsics": { "fx": 1400, "fy": 1400, "cx": 960, "cy": 720 },
//!       "intrinsics_resolution": [1920, 1440] },
//!     { "raw": { "path": "frames/0002.bgra", "width": 1920, "height": 1440,
//!                "pixel_format": "bgra8" },
//!       "transform": [...], "timestamp": 0.2, "intrinsics": { ... } }
//!   ]
//! }
//! ```
//!
//! An anchor may point at raw little-endian buffers instead of listing its
//! geometry inline:
//!
//! ```json
//! { "id": "a1", "raw": { "vertices": "anchors/a1.vtx", "vertex_count": 812,
//!                        "vertex_stride": 16, "indices": "anchors/a1.idx",
//!                        "primitive_count": 1500 } }
//! ```
//!
//! Raw frames may give the platform bitmap flags (`byte_order_little`,
//! `alpha_first`) instead of `pixel_format`.
//!
//! Transforms are 16 floats in column-major order. Relative paths are
//! resolved against the manifest's directory.

use glam::{Mat4, Vec3};
use prism_capture::{
    CapturedFrame, FrameDescriptor, FrameError, FrameIndex, ImageFileSource, Intrinsics,
    PixelBuffer, PixelFormat, collect_frames,
};
use prism_data::{GeometryError, IndexLayout, MeshAnchor, VertexLayout};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame {index}: exactly one of `image` or `raw` must be given")]
    FrameSource { index: usize },

    #[error("Frame {index}: {source}")]
    RawFrame {
        index: usize,
        #[source]
        source: FrameError,
    },

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Anchor {id}: inline geometry and `raw` buffers are mutually exclusive")]
    AnchorSource { id: String },

    #[error("Anchor {id}: {source}")]
    Anchor {
        id: String,
        #[source]
        source: GeometryError,
    },
}

fn identity() -> [f32; 16] {
    Mat4::IDENTITY.to_cols_array()
}

fn packed_stride() -> usize {
    12
}

fn u32_indices() -> usize {
    4
}

fn triangles() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub id: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default = "identity")]
    pub transform: [f32; 16],
    #[serde(default)]
    pub vertices: Vec<[f32; 3]>,
    #[serde(default)]
    pub indices: Vec<[u32; 3]>,
    #[serde(default)]
    pub raw: Option<RawMesh>,
}

/// Vertex and index buffers dumped straight from the capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMesh {
    pub vertices: PathBuf,
    pub vertex_count: usize,
    #[serde(default = "packed_stride")]
    pub vertex_stride: usize,
    #[serde(default)]
    pub vertex_offset: usize,
    /// No index buffer means a bare point set.
    #[serde(default)]
    pub indices: Option<PathBuf>,
    #[serde(default = "u32_indices")]
    pub bytes_per_index: usize,
    #[serde(default = "triangles")]
    pub indices_per_primitive: usize,
    #[serde(default)]
    pub primitive_count: usize,
}

impl RawMesh {
    fn vertex_layout(&self) -> VertexLayout {
        VertexLayout {
            stride: self.vertex_stride,
            offset: self.vertex_offset,
            count: self.vertex_count,
        }
    }

    fn index_layout(&self) -> IndexLayout {
        IndexLayout {
            bytes_per_index: self.bytes_per_index,
            indices_per_primitive: self.indices_per_primitive,
            primitive_count: if self.indices.is_some() {
                self.primitive_count
            } else {
                0
            },
        }
    }
}

impl AnchorEntry {
    pub fn to_anchor(&self) -> Result<MeshAnchor, ManifestError> {
        let transform = Mat4::from_cols_array(&self.transform);
        let Some(raw) = &self.raw else {
            return Ok(MeshAnchor::new(
                self.id.clone(),
                self.timestamp,
                transform,
                self.vertices.iter().copied().map(Vec3::from_array).collect(),
                self.indices.clone(),
            ));
        };
        if !self.vertices.is_empty() || !self.indices.is_empty() {
            return Err(ManifestError::AnchorSource {
                id: self.id.clone(),
            });
        }

        let vertex_bytes = read_bytes(&raw.vertices)?;
        let index_bytes = match &raw.indices {
            Some(path) => read_bytes(path)?,
            None => Vec::new(),
        };
        MeshAnchor::from_raw(
            self.id.clone(),
            self.timestamp,
            transform,
            &vertex_bytes,
            raw.vertex_layout(),
            &index_bytes,
            raw.index_layout(),
        )
        .map_err(|source| ManifestError::Anchor {
            id: self.id.clone(),
            source,
        })
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ManifestError> {
    std::fs::read(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// An uncompressed 4-byte-per-pixel dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Defaults to tightly packed rows.
    #[serde(default)]
    pub row_stride: Option<usize>,
    /// Defaults to the bitmap flags below, then the run's configured format.
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    /// 32-bit little-endian pixel words, as reported by the platform.
    #[serde(default)]
    pub byte_order_little: Option<bool>,
    /// Alpha stored before the color channels.
    #[serde(default)]
    pub alpha_first: Option<bool>,
}

impl RawImage {
    /// Declared format, else the one implied by the bitmap flags.
    pub fn format(&self) -> Option<PixelFormat> {
        self.pixel_format.or_else(|| match (self.byte_order_little, self.alpha_first) {
            (None, None) => None,
            (little, alpha_first) => Some(PixelFormat::detect(
                little.unwrap_or(false),
                alpha_first.unwrap_or(false),
            )),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEntry {
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub raw: Option<RawImage>,
    pub transform: [f32; 16],
    pub intrinsics: Intrinsics,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub intrinsics_resolution: Option<(u32, u32)>,
}

/// A scan snapshot as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub anchors: Vec<AnchorEntry>,
    #[serde(default)]
    pub frames: Vec<FrameEntry>,
}

impl Snapshot {
    /// Read a manifest and resolve its relative paths.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut snapshot: Snapshot = serde_json::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));
        snapshot.resolve_paths(base);
        info!(
            "Loaded snapshot {}: {} anchors, {} frames",
            path.display(),
            snapshot.anchors.len(),
            snapshot.frames.len()
        );
        Ok(snapshot)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for raw in self.anchors.iter_mut().filter_map(|a| a.raw.as_mut()) {
            raw.vertices = base.join(&raw.vertices);
            if let Some(indices) = raw.indices.as_mut() {
                *indices = base.join(&*indices);
            }
        }
        for frame in &mut self.frames {
            if let Some(image) = frame.image.as_mut() {
                *image = base.join(&*image);
            }
            if let Some(raw) = frame.raw.as_mut() {
                raw.path = base.join(&raw.path);
            }
        }
    }

    /// Build every anchor, reading raw buffers from disk.
    pub fn mesh_anchors(&self) -> Result<Vec<MeshAnchor>, ManifestError> {
        self.anchors.iter().map(AnchorEntry::to_anchor).collect()
    }

    /// Decode every frame. Raw dumps without a declared channel order use
    /// `default_format`.
    pub fn frame_index(&self, default_format: PixelFormat) -> Result<FrameIndex, ManifestError> {
        let mut descriptors = Vec::new();
        let mut frames = Vec::new();

        for (index, entry) in self.frames.iter().enumerate() {
            let pose = Mat4::from_cols_array(&entry.transform);
            match (&entry.image, &entry.raw) {
                (Some(image), None) => descriptors.push(FrameDescriptor {
                    image: image.clone(),
                    pose,
                    intrinsics: entry.intrinsics,
                    timestamp: entry.timestamp,
                    intrinsics_resolution: entry.intrinsics_resolution,
                }),
                (None, Some(raw)) => {
                    let frame = load_raw(raw, entry, pose, default_format)
                        .map_err(|source| ManifestError::RawFrame { index, source })?;
                    frames.push(frame);
                }
                _ => return Err(ManifestError::FrameSource { index }),
            }
        }

        if !descriptors.is_empty() {
            let mut source = ImageFileSource::new(descriptors);
            let decoded = collect_frames(&mut source)?;
            debug!("Decoded {} image frames", source.loaded());
            frames.extend(decoded.into_frames());
        }
        Ok(FrameIndex::new(frames))
    }
}

fn load_raw(
    raw: &RawImage,
    entry: &FrameEntry,
    pose: Mat4,
    default_format: PixelFormat,
) -> Result<CapturedFrame, FrameError> {
    let data = std::fs::read(&raw.path)?;
    let format = raw.format().unwrap_or(default_format);
    let stride = raw.row_stride.unwrap_or(raw.width as usize * 4);
    let pixels = PixelBuffer::new(raw.width, raw.height, stride, format, data)?;
    let size = (raw.width, raw.height);
    let intrinsics = match entry.intrinsics_resolution {
        Some(from) if from != size && from.0 > 0 && from.1 > 0 => {
            entry.intrinsics.scaled(from, size)
        }
        _ => entry.intrinsics,
    };
    CapturedFrame::new(pixels, pose, intrinsics, entry.timestamp)
}
