//! Prism Fusion Crate
//!
//! This crate turns a scan snapshot (mesh anchors plus posed camera frames)
//! into a colored, optionally densified point cloud written as ASCII PLY.
//!
//! ## Modules
//!
//! - [`config`]: Run configuration with serde defaults
//! - [`fusion`]: Frame scoring, single-best selection and weighted blending
//! - [`cloud`]: Densification, outlier removal and color enhancement
//! - [`pipeline`]: The batch driver, progress reporting and cancellation
//! - [`error`]: Errors that abort a run

pub mod cloud;
pub mod config;
pub mod error;
pub mod fusion;
pub mod pipeline;

pub use config::FusionConfig;
pub use error::FuseError;
pub use fusion::{ColorFusion, FusedColor, FusionMode};
pub use pipeline::{CancelToken, FusionPipeline, ProgressObserver, RunStats};
