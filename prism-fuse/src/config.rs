//! Fusion run configuration

use crate::error::FuseError;
use prism_capture::PixelFormat;
use serde::{Deserialize, Serialize};

/// Knobs for a fusion run. Every field has a default, so partial JSON
/// configs are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Synthesize jittered neighbors around each surface point.
    pub subdivision: bool,
    /// Number of densification levels. Default: 2.
    pub max_subdivision_level: u32,
    /// Blend the top frames instead of taking the single best one.
    pub blending: bool,
    /// Frames blended per point (K). Default: 3.
    pub blend_frames: usize,
    /// Scale of the inverse-distance term in frame scores. Default: 2.0.
    pub spatial_weight: f32,
    /// Vertices fused between cancellation checks. Default: 2000.
    pub batch_size: usize,
    /// Drop points far from the cloud centroid.
    pub outlier_filtering: bool,
    /// Standard deviations from the centroid beyond which a point is dropped. Default: 2.0.
    pub outlier_threshold: f32,
    /// Measure the outlier cut from the mean centroid distance instead of from zero.
    pub outlier_relative_to_mean: bool,
    /// Apply the perceptual contrast/saturation boost.
    pub color_enhancement: bool,
    /// Emit the `confidence` property in the PLY output.
    pub write_confidence: bool,
    /// Seed for densification jitter; `None` draws from the OS.
    pub seed: Option<u64>,
    /// Worker threads for point fusion; `None` uses the global pool.
    pub workers: Option<usize>,
    /// Channel order assumed for raw frame buffers that do not declare one.
    pub pixel_format: PixelFormat,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            subdivision: false,
            max_subdivision_level: 2,
            blending: true,
            blend_frames: 3,
            spatial_weight: 2.0,
            batch_size: 2000,
            outlier_filtering: true,
            outlier_threshold: 2.0,
            outlier_relative_to_mean: false,
            color_enhancement: true,
            write_confidence: true,
            seed: None,
            workers: None,
            pixel_format: PixelFormat::Rgba8,
        }
    }
}

impl FusionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse raw colors only: no densification, filtering or enhancement.
    pub fn raw() -> Self {
        Self {
            outlier_filtering: false,
            color_enhancement: false,
            ..Self::default()
        }
    }

    pub fn with_subdivision(mut self, max_level: u32) -> Self {
        self.subdivision = true;
        self.max_subdivision_level = max_level;
        self
    }

    pub fn with_blending(mut self, frames: usize) -> Self {
        self.blending = true;
        self.blend_frames = frames;
        self
    }

    pub fn single_best(mut self) -> Self {
        self.blending = false;
        self
    }

    pub fn with_spatial_weight(mut self, weight: f32) -> Self {
        self.spatial_weight = weight;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_outlier_threshold(mut self, threshold: f32) -> Self {
        self.outlier_filtering = true;
        self.outlier_threshold = threshold;
        self
    }

    pub fn without_outlier_filtering(mut self) -> Self {
        self.outlier_filtering = false;
        self
    }

    pub fn with_color_enhancement(mut self, enabled: bool) -> Self {
        self.color_enhancement = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn validate(&self) -> Result<(), FuseError> {
        let invalid = |msg: String| Err(FuseError::InvalidConfig(msg));
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if self.blending && self.blend_frames == 0 {
            return invalid("blend_frames must be at least 1".into());
        }
        if !(self.spatial_weight.is_finite() && self.spatial_weight > 0.0) {
            return invalid(format!("spatial_weight must be positive, got {}", self.spatial_weight));
        }
        if self.outlier_filtering
            && !(self.outlier_threshold.is_finite() && self.outlier_threshold > 0.0)
        {
            return invalid(format!(
                "outlier_threshold must be positive, got {}",
                self.outlier_threshold
            ));
        }
        if self.workers == Some(0) {
            return invalid("workers must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::default();
        assert!(!config.subdivision);
        assert_eq!(config.max_subdivision_level, 2);
        assert!(config.blending);
        assert_eq!(config.blend_frames, 3);
        assert_eq!(config.spatial_weight, 2.0);
        assert!(config.outlier_filtering);
        assert_eq!(config.outlier_threshold, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FusionConfig =
            serde_json::from_str(r#"{ "blend_frames": 5, "subdivision": true }"#).unwrap();
        assert_eq!(config.blend_frames, 5);
        assert!(config.subdivision);
        assert_eq!(config.batch_size, FusionConfig::default().batch_size);

        let config: FusionConfig = serde_json::from_str(r#"{ "pixel_format": "bgra8" }"#).unwrap();
        assert_eq!(config.pixel_format, PixelFormat::Bgra8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(FusionConfig::new().with_batch_size(0).validate().is_err());
        assert!(FusionConfig::new().with_blending(0).validate().is_err());
        assert!(FusionConfig::new().with_spatial_weight(-1.0).validate().is_err());
        assert!(FusionConfig::new().with_outlier_threshold(0.0).validate().is_err());
        assert!(FusionConfig::new().with_workers(0).validate().is_err());
        // Blend count is irrelevant in single-best mode.
        let mut config = FusionConfig::new().single_best();
        config.blend_frames = 0;
        assert!(config.validate().is_ok());
    }
}
