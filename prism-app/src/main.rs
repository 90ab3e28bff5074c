//! Prism Application
//!
//! Command-line front end for scan color fusion.
//!
//! Features:
//! - Loads a JSON scan snapshot (mesh anchors and posed frames)
//! - Fuses per-point colors from every frame that sees the point
//! - Optional densification, outlier removal and color enhancement
//! - Streams the result to an ASCII PLY file

mod app;
mod manifest;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Prism - Multi-view color fusion for scanned meshes
#[derive(Parser, Debug)]
#[command(name = "prism")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Scan snapshot manifest (JSON)
    snapshot: PathBuf,

    /// Output PLY path
    #[arg(short, long, default_value = "cloud.ply")]
    output: PathBuf,

    /// Fusion config file (JSON); missing fields use defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames blended per point
    #[arg(long)]
    blend_frames: Option<usize>,

    /// Take the single best frame instead of blending
    #[arg(long)]
    no_blend: bool,

    /// Densify with jittered neighbors up to this level
    #[arg(long, value_name = "LEVEL")]
    subdivide: Option<u32>,

    /// Outlier threshold in standard deviations
    #[arg(long)]
    outlier_threshold: Option<f32>,

    /// Disable outlier removal
    #[arg(long)]
    no_outliers: bool,

    /// Disable color enhancement
    #[arg(long)]
    no_enhance: bool,

    /// Omit the confidence property from the output
    #[arg(long)]
    no_confidence: bool,

    /// Vertices per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seed for densification jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads (default: one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Channel order of raw frames that do not declare one (rgba8, bgra8)
    #[arg(long)]
    pixel_format: Option<prism_capture::PixelFormat>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = app::run(args) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
