//! Errors for fusion runs

use prism_data::{GeometryError, PlyError};
use thiserror::Error;

/// Errors that abort a fusion run.
///
/// Per-point sampling failures and malformed triangles are recovered
/// locally and never show up here.
#[derive(Debug, Error)]
pub enum FuseError {
    #[error("No mesh anchors to process")]
    NoMeshAnchors,

    #[error("No captured frames to sample colors from")]
    NoFrames,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("PLY output error: {0}")]
    Ply(#[from] PlyError),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}
