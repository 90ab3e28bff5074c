//! Global statistical outlier removal.
//!
//! Distances are measured to the centroid of the whole cloud, so this must
//! run once over the finished cloud and never per anchor.

use glam::Vec3;
use prism_data::ColoredPoint;
use tracing::debug;

/// The filter is a no-op for clouds of this size or smaller.
pub const MIN_POINTS_FOR_FILTER: usize = 10;

/// Parameters for outlier removal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierParams {
    /// Standard deviations beyond which a point is dropped. Default: 2.0.
    pub threshold: f32,
    /// Cut at `mean + threshold * std` instead of `threshold * std`.
    pub relative_to_mean: bool,
}

impl Default for OutlierParams {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            relative_to_mean: false,
        }
    }
}

impl OutlierParams {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn relative_to_mean(mut self, enabled: bool) -> Self {
        self.relative_to_mean = enabled;
        self
    }
}

/// Summary of an outlier pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutlierReport {
    pub original_count: usize,
    pub removed: usize,
    pub centroid: Vec3,
    pub mean_distance: f32,
    /// Population standard deviation of centroid distances.
    pub std_dev: f32,
    /// Points farther than this from the centroid were dropped.
    pub cutoff: f32,
}

impl std::fmt::Display for OutlierReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Outlier removal: {} -> {} points ({} removed, cutoff {:.4})",
            self.original_count,
            self.original_count - self.removed,
            self.removed,
            self.cutoff
        )
    }
}

/// Drop points whose distance to the centroid exceeds the cutoff.
pub fn remove_outliers(
    points: Vec<ColoredPoint>,
    params: &OutlierParams,
) -> (Vec<ColoredPoint>, OutlierReport) {
    let original_count = points.len();
    if original_count <= MIN_POINTS_FOR_FILTER {
        return (
            points,
            OutlierReport {
                original_count,
                cutoff: f32::INFINITY,
                ..OutlierReport::default()
            },
        );
    }

    let n = original_count as f32;
    let centroid = points.iter().map(|p| p.position).sum::<Vec3>() / n;
    let distances: Vec<f32> = points
        .iter()
        .map(|p| p.position.distance(centroid))
        .collect();
    let mean_distance = distances.iter().sum::<f32>() / n;
    let variance = distances
        .iter()
        .map(|d| (d - mean_distance).powi(2))
        .sum::<f32>()
        / n;
    let std_dev = variance.sqrt();

    let cutoff = if params.relative_to_mean {
        mean_distance + std_dev * params.threshold
    } else {
        std_dev * params.threshold
    };

    let kept: Vec<ColoredPoint> = points
        .into_iter()
        .zip(&distances)
        .filter_map(|(p, &d)| (d <= cutoff).then_some(p))
        .collect();

    let report = OutlierReport {
        original_count,
        removed: original_count - kept.len(),
        centroid,
        mean_distance,
        std_dev,
        cutoff,
    };
    debug!("{}", report);
    (kept, report)
}
