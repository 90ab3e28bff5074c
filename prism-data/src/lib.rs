//! Prism Data Crate
//!
//! Point, mesh anchor and PLY utilities for scan color fusion.
//! This crate is camera-agnostic and focuses on data parsing and geometric operations.

pub mod geometry;
pub mod ply;
pub mod types;

pub use geometry::{
    AnchorGeometry, GeometryError, IndexLayout, MeshAnchor, VertexLayout, vertex_normals,
};
pub use ply::{
    PlyCloud, PlyError, PlyHeader, PlyLayout, PlySink, PlyWriter, SYNTHESIZED_COMMENT,
    WriterState, read_header, read_ply,
};
pub use types::{ColoredPoint, Normal3, Rgb, Vertex3, defined_normal};
