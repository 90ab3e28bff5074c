//! Batch driver: anchors in, colored PLY out.

use crate::cloud::{Densifier, OutlierParams, SurfacePoint, enhance, remove_outliers};
use crate::config::FusionConfig;
use crate::error::FuseError;
use crate::fusion::ColorFusion;
use crate::pipeline::progress::{CancelToken, ProgressObserver, RunStats};
use prism_capture::FrameIndex;
use prism_data::{ColoredPoint, MeshAnchor, PlyLayout, PlySink, PlyWriter, defined_normal};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::Path;
use tracing::{debug, info, warn};

/// Runs the fusion pipeline with a fixed configuration.
pub struct FusionPipeline {
    config: FusionConfig,
    pool: Option<ThreadPool>,
}

impl FusionPipeline {
    /// Validate `config` and build the worker pool if a size was requested.
    pub fn new(config: FusionConfig) -> Result<Self, FuseError> {
        config.validate()?;
        let pool = config
            .workers
            .map(|n| {
                ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("prism-fuse-{i}"))
                    .build()
                    .map_err(|e| FuseError::WorkerPool(e.to_string()))
            })
            .transpose()?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// PLY layout this configuration writes.
    pub fn layout(&self) -> PlyLayout {
        let layout = if self.config.write_confidence {
            PlyLayout::with_confidence()
        } else {
            PlyLayout::colored()
        };
        layout.synthesized(self.config.subdivision)
    }

    /// Fuse every anchor against `frames` and write the cloud to `output`.
    ///
    /// Missing anchors or frames fail before anything is written. Once the
    /// header is out, the file is always finalized: a cancelled run or a
    /// late failure leaves a valid PLY with the points computed so far.
    pub fn run(
        &self,
        anchors: &[MeshAnchor],
        frames: &FrameIndex,
        output: &Path,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<RunStats, FuseError> {
        check_inputs(anchors, frames, observer)?;
        let writer = match PlyWriter::create(output, self.layout()) {
            Ok(writer) => writer,
            Err(e) => {
                observer.on_progress(&format!("Failed: {e}"), 0.0);
                return Err(e.into());
            }
        };
        self.run_to_writer(anchors, frames, writer, observer, cancel)
    }

    /// [`run`](Self::run) into a writer the caller opened.
    ///
    /// The writer must still be uninitialized. If the header cannot be
    /// written the file is deleted.
    #[tracing::instrument(skip_all, fields(anchors = anchors.len(), frames = frames.len()))]
    pub fn run_to_writer<S: PlySink>(
        &self,
        anchors: &[MeshAnchor],
        frames: &FrameIndex,
        mut writer: PlyWriter<S>,
        observer: &mut dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> Result<RunStats, FuseError> {
        if let Err(e) = check_inputs(anchors, frames, observer) {
            discard(writer);
            return Err(e);
        }

        let densifier = self
            .config
            .subdivision
            .then(|| Densifier::new(self.config.max_subdivision_level, self.config.seed));
        let per_vertex = densifier.as_ref().map_or(1, |d| d.max_points_per_input());
        let estimated = anchors.iter().map(|a| a.vertices.len()).sum::<usize>() * per_vertex;
        if let Err(e) = writer.write_header(estimated) {
            observer.on_progress(&format!("Failed: {e}"), 0.0);
            discard(writer);
            return Err(e.into());
        }
        info!(
            "Fusing {} anchors against {} frames (estimated {} points)",
            anchors.len(),
            frames.len(),
            estimated
        );
        observer.on_progress(&format!("Processing {} mesh anchors", anchors.len()), 0.0);

        let mut run = FusionRun {
            pipeline: self,
            fusion: ColorFusion::from_config(frames, &self.config),
            densifier,
            writer,
            buffer: self.config.outlier_filtering.then(Vec::new),
            stats: RunStats::default(),
        };

        let total = anchors.len();
        let mut fraction = 0.0;
        for (i, anchor) in anchors.iter().enumerate() {
            fraction = i as f32 / total as f32;
            observer.on_progress(
                &format!("Processing anchor {}/{} ({})", i + 1, total, anchor.id),
                fraction,
            );
            match run.anchor(anchor, cancel) {
                Ok(true) => run.stats.anchors_processed += 1,
                Ok(false) => {
                    run.stats.cancelled = true;
                    break;
                }
                Err(e) => {
                    observer.on_progress(&format!("Failed: {e}"), fraction);
                    run.abandon();
                    return Err(e);
                }
            }
        }

        match run.finish() {
            Ok(stats) if stats.cancelled => {
                warn!("Cancelled after {} anchors", stats.anchors_processed);
                observer.on_progress(
                    &format!("Cancelled: {} points written", stats.points_written),
                    fraction,
                );
                Ok(stats)
            }
            Ok(stats) => {
                info!("{}", stats);
                observer.on_progress(
                    &format!("Completed: {} points written", stats.points_written),
                    1.0,
                );
                Ok(stats)
            }
            Err(e) => {
                observer.on_progress(&format!("Failed: {e}"), fraction);
                Err(e)
            }
        }
    }

    fn fuse_batch(&self, fusion: &ColorFusion<'_>, points: &[SurfacePoint]) -> Vec<ColoredPoint> {
        let enhance_colors = self.config.color_enhancement;
        let fuse = || {
            points
                .par_iter()
                .map(|p| {
                    let fused = fusion.color_for(p.position, p.normal);
                    let color = if enhance_colors && !fused.is_unseen() {
                        enhance(fused.color, fused.confidence)
                    } else {
                        fused.color
                    };
                    ColoredPoint::new(p.position, color, fused.confidence)
                })
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(fuse),
            None => fuse(),
        }
    }
}

fn check_inputs(
    anchors: &[MeshAnchor],
    frames: &FrameIndex,
    observer: &mut dyn ProgressObserver,
) -> Result<(), FuseError> {
    if anchors.is_empty() {
        observer.on_progress("Failed: no mesh anchors, nothing written", 0.0);
        return Err(FuseError::NoMeshAnchors);
    }
    if frames.is_empty() {
        observer.on_progress("Failed: no captured frames, nothing written", 0.0);
        return Err(FuseError::NoFrames);
    }
    Ok(())
}

fn discard<S: PlySink>(writer: PlyWriter<S>) {
    let path = writer.path().to_path_buf();
    if let Err(e) = writer.discard() {
        warn!("Could not remove {}: {}", path.display(), e);
    }
}

/// Mutable state of one [`FusionPipeline::run_to_writer`].
struct FusionRun<'a, S: PlySink> {
    pipeline: &'a FusionPipeline,
    fusion: ColorFusion<'a>,
    densifier: Option<Densifier>,
    writer: PlyWriter<S>,
    /// Holds the whole cloud when the global outlier filter must see it.
    buffer: Option<Vec<ColoredPoint>>,
    stats: RunStats,
}

impl<S: PlySink> FusionRun<'_, S> {
    /// Fuse one anchor batch by batch. Returns `false` if cancelled.
    fn anchor(&mut self, anchor: &MeshAnchor, cancel: &CancelToken) -> Result<bool, FuseError> {
        let geometry = anchor.extract();
        self.stats.malformed_triangles += geometry.skipped_triangles;
        let batch_size = self.pipeline.config.batch_size;

        let mut surface = Vec::with_capacity(batch_size);
        let batches = geometry
            .vertices
            .chunks(batch_size)
            .zip(geometry.normals.chunks(batch_size));
        for (batch, (vertices, normals)) in batches.enumerate() {
            if cancel.is_cancelled() {
                debug!("Cancellation seen at batch {} of anchor {}", batch, anchor.id);
                return Ok(false);
            }

            surface.clear();
            for (&local, &normal) in vertices.iter().zip(normals) {
                let point = SurfacePoint::measured(
                    anchor.point_to_world(local),
                    defined_normal(anchor.normal_to_world(normal)),
                );
                match self.densifier.as_mut() {
                    Some(densifier) => densifier.densify_into(point, &mut surface),
                    None => surface.push(point),
                }
            }
            self.stats.vertices_in += vertices.len();

            let fused = self.pipeline.fuse_batch(&self.fusion, &surface);
            debug!(
                "Anchor {} batch {}: {} vertices -> {} points",
                anchor.id,
                batch,
                vertices.len(),
                fused.len()
            );
            self.emit(fused)?;
        }
        Ok(true)
    }

    fn emit(&mut self, points: Vec<ColoredPoint>) -> Result<(), FuseError> {
        let unseen = points.iter().filter(|p| p.confidence == 0.0).count();
        self.stats.points_generated += points.len();
        self.stats.sentinel_points += unseen;
        if self.pipeline.config.color_enhancement {
            self.stats.enhanced_points += points.len() - unseen;
        }
        match self.buffer.as_mut() {
            Some(buffer) => buffer.extend(points),
            None => self.writer.append(&points)?,
        }
        Ok(())
    }

    /// Filter the buffered cloud if any, then finalize the file.
    fn finish(mut self) -> Result<RunStats, FuseError> {
        if let Some(buffer) = self.buffer.take() {
            let config = &self.pipeline.config;
            let params = OutlierParams::new(config.outlier_threshold)
                .relative_to_mean(config.outlier_relative_to_mean);
            let (kept, report) = remove_outliers(buffer, &params);
            info!("{}", report);
            self.stats.outliers_removed = report.removed;
            if let Err(e) = self.writer.append(&kept) {
                self.abandon();
                return Err(e.into());
            }
        }
        self.stats.points_written = self.writer.finalize()?;
        Ok(self.stats)
    }

    /// Best-effort finalize after a failure so the header matches the body.
    fn abandon(mut self) {
        match self.writer.finalize() {
            Ok(count) => warn!("Run failed; kept {} points in {}", count, self.writer.path().display()),
            Err(e) => warn!("Run failed and {} could not be finalized: {}", self.writer.path().display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = FusionPipeline::new(FusionConfig::new().with_batch_size(0));
        assert!(matches!(result, Err(FuseError::InvalidConfig(_))));
    }

    #[test]
    fn test_layout_marks_synthesized_points() {
        let plain = FusionPipeline::new(FusionConfig::raw()).unwrap().layout();
        assert!(!plain.synthesized);
        assert!(plain.with_confidence);

        let config = FusionConfig::raw().with_subdivision(2);
        assert!(FusionPipeline::new(config).unwrap().layout().synthesized);
    }

    #[test]
    fn test_dedicated_pool_is_built() {
        let pipeline = FusionPipeline::new(FusionConfig::new().with_workers(2)).unwrap();
        assert_eq!(pipeline.pool.as_ref().map(|p| p.current_num_threads()), Some(2));
    }
}
