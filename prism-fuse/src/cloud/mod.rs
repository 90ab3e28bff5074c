//! Point-cloud post-processing: densification, outlier removal and color
//! enhancement.

pub mod densify;
pub mod enhance;
pub mod outlier;

pub use densify::{Densifier, Provenance, SurfacePoint, children_at, jitter_scale};
pub use enhance::{Hsv, enhance};
pub use outlier::{MIN_POINTS_FOR_FILTER, OutlierParams, OutlierReport, remove_outliers};
