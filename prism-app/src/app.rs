//! Wires a snapshot, a configuration and the fusion pipeline together.

use crate::Args;
use crate::manifest::Snapshot;
use prism_fuse::pipeline::LogProgress;
use prism_fuse::{CancelToken, FusionConfig, FusionPipeline};
use std::error::Error;
use tracing::info;

/// Load the config file if given, then apply command-line overrides.
pub fn resolve_config(args: &Args) -> Result<FusionConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let config: FusionConfig = serde_json::from_str(&text)?;
            info!("Loaded config from {}", path.display());
            config
        }
        None => FusionConfig::default(),
    };

    if let Some(frames) = args.blend_frames {
        config = config.with_blending(frames);
    }
    if args.no_blend {
        config = config.single_best();
    }
    if let Some(level) = args.subdivide {
        config = config.with_subdivision(level);
    }
    if let Some(threshold) = args.outlier_threshold {
        config = config.with_outlier_threshold(threshold);
    }
    if args.no_outliers {
        config = config.without_outlier_filtering();
    }
    if args.no_enhance {
        config = config.with_color_enhancement(false);
    }
    if args.no_confidence {
        config.write_confidence = false;
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    if let Some(format) = args.pixel_format {
        config = config.with_pixel_format(format);
    }
    config.validate()?;
    Ok(config)
}

pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = resolve_config(&args)?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let snapshot = Snapshot::load(&args.snapshot)?;
    let anchors = snapshot.mesh_anchors()?;
    let frames = snapshot.frame_index(config.pixel_format)?;

    let pipeline = FusionPipeline::new(config)?;
    let stats = pipeline.run(
        &anchors,
        &frames,
        &args.output,
        &mut LogProgress,
        &CancelToken::new(),
    )?;

    println!("Wrote {}: {}", args.output.display(), stats);
    if stats.malformed_triangles > 0 {
        println!("Skipped {} malformed triangles", stats.malformed_triangles);
    }
    Ok(())
}
