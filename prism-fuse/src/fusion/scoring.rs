//! Per-frame visibility and quality scores.

use glam::Vec3;
use prism_capture::{CapturedFrame, Projection};

/// Added to the camera distance so very close points do not blow up.
pub const DISTANCE_EPSILON: f32 = 0.01;
/// Floor of the viewing-angle factor; noisy normals never zero a score.
pub const MIN_ALIGNMENT: f32 = 0.1;
/// Multiplier for points that project outside the image.
pub const OUT_OF_VIEW_FACTOR: f32 = 0.05;
/// Cap of the centrality penalty.
pub const MAX_CENTER_PENALTY: f32 = 0.5;

/// Score of one frame for one point, with the projection it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewScore {
    pub score: f32,
    pub projection: Projection,
}

/// Score how well `frame` sees `point`.
///
/// `score = spatial_weight / (distance + 0.01)`, times `max(0.1, cos)` when
/// a normal is known, times 0.05 outside the image or the centrality factor
/// `1 - min(0.5, center_distance / max(width, height))` inside it.
pub fn score_view(
    point: Vec3,
    normal: Option<Vec3>,
    frame: &CapturedFrame,
    spatial_weight: f32,
) -> ViewScore {
    let camera = frame.position();
    let to_camera = (camera - point).normalize_or_zero();
    let mut score = (1.0 / (camera.distance(point) + DISTANCE_EPSILON)) * spatial_weight;

    if let Some(n) = normal {
        score *= to_camera.dot(n).max(MIN_ALIGNMENT);
    }

    let projection = frame.project(point);
    let (width, height) = frame.dimensions();
    if projection.in_image(width, height) {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let center_distance =
            ((projection.x - center_x).powi(2) + (projection.y - center_y).powi(2)).sqrt();
        let extent = width.max(height) as f32;
        score *= 1.0 - (center_distance / extent).min(MAX_CENTER_PENALTY);
    } else {
        score *= OUT_OF_VIEW_FACTOR;
    }

    ViewScore {
        score: score.max(0.0),
        projection,
    }
}

/// Just the scalar score of [`score_view`].
pub fn score_frame(
    point: Vec3,
    normal: Option<Vec3>,
    frame: &CapturedFrame,
    spatial_weight: f32,
) -> f32 {
    score_view(point, normal, frame, spatial_weight).score
}
