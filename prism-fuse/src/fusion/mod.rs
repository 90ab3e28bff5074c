//! Multi-view color fusion
//!
//! Scores every frame for a point, then either takes the best frame or
//! blends the top K frames weighted by score.

pub mod blend;
pub mod scoring;

pub use blend::{ColorFusion, FusedColor, FusionMode, MIN_BLEND_SCORE, blend_weighted};
pub use scoring::{ViewScore, score_frame, score_view};
