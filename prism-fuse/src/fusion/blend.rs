//! Multi-view color selection and blending.

use crate::config::FusionConfig;
use crate::fusion::scoring::score_view;
use glam::Vec3;
use ordered_float::OrderedFloat;
use prism_capture::{CapturedFrame, FrameIndex};
use prism_data::Rgb;
use std::cmp::Reverse;

/// Frames scoring at or below this are never blended.
pub const MIN_BLEND_SCORE: f32 = 0.01;

/// How a point's color is chosen from the frames that see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// Take the highest-scoring frame.
    SingleBest,
    /// Score-weighted average of the top `frames` frames.
    Blend { frames: usize },
}

/// A fused color and how much evidence backs it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedColor {
    pub color: Rgb,
    /// 0 when no frame could be sampled, otherwise the best score (capped at 1).
    pub confidence: f32,
}

impl FusedColor {
    pub const UNSEEN: FusedColor = FusedColor {
        color: Rgb::SENTINEL,
        confidence: 0.0,
    };

    pub fn is_unseen(&self) -> bool {
        self.confidence == 0.0
    }
}

struct Candidate<'a> {
    frame: &'a CapturedFrame,
    score: f32,
    x: f32,
    y: f32,
}

/// Colors points from a [`FrameIndex`].
#[derive(Clone, Copy)]
pub struct ColorFusion<'a> {
    frames: &'a FrameIndex,
    mode: FusionMode,
    spatial_weight: f32,
}

impl<'a> ColorFusion<'a> {
    pub fn new(frames: &'a FrameIndex, mode: FusionMode, spatial_weight: f32) -> Self {
        Self {
            frames,
            mode,
            spatial_weight,
        }
    }

    pub fn from_config(frames: &'a FrameIndex, config: &FusionConfig) -> Self {
        let mode = if config.blending {
            FusionMode::Blend {
                frames: config.blend_frames,
            }
        } else {
            FusionMode::SingleBest
        };
        Self::new(frames, mode, config.spatial_weight)
    }

    pub fn mode(&self) -> FusionMode {
        self.mode
    }

    /// Color and confidence for a world point with an optional world normal.
    pub fn color_for(&self, point: Vec3, normal: Option<Vec3>) -> FusedColor {
        match self.mode {
            FusionMode::SingleBest => self.single_best(point, normal),
            FusionMode::Blend { frames } => self.blend(point, normal, frames),
        }
    }

    /// Frames sorted by descending score, keeping only those above `min_score`.
    fn ranked(&self, point: Vec3, normal: Option<Vec3>, min_score: f32) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> = self
            .frames
            .iter()
            .filter_map(|frame| {
                let view = score_view(point, normal, frame, self.spatial_weight);
                (view.score > min_score && !view.projection.behind).then_some(Candidate {
                    frame,
                    score: view.score,
                    x: view.projection.x,
                    y: view.projection.y,
                })
            })
            .collect();
        candidates.sort_by_key(|c| Reverse(OrderedFloat(c.score)));
        candidates
    }

    fn single_best(&self, point: Vec3, normal: Option<Vec3>) -> FusedColor {
        self.ranked(point, normal, 0.0)
            .iter()
            .find_map(|c| c.frame.try_sample(c.x, c.y))
            .map(|color| FusedColor {
                color,
                confidence: 1.0,
            })
            .unwrap_or(FusedColor::UNSEEN)
    }

    fn blend(&self, point: Vec3, normal: Option<Vec3>, k: usize) -> FusedColor {
        let samples: Vec<(Rgb, f32)> = self
            .ranked(point, normal, MIN_BLEND_SCORE)
            .iter()
            .filter_map(|c| c.frame.try_sample(c.x, c.y).map(|color| (color, c.score)))
            .take(k)
            .collect();

        match samples.as_slice() {
            [] => FusedColor::UNSEEN,
            [(color, score)] => FusedColor {
                color: *color,
                confidence: score.min(1.0),
            },
            _ => {
                let best = samples.iter().map(|(_, s)| *s).fold(0.0, f32::max);
                FusedColor {
                    color: blend_weighted(&samples),
                    confidence: best.min(1.0),
                }
            }
        }
    }
}

/// Score-weighted average per channel: `sum(c * s) / sum(s)`, rounded.
pub fn blend_weighted(samples: &[(Rgb, f32)]) -> Rgb {
    let total: f32 = samples.iter().map(|(_, s)| s).sum();
    if total <= 0.0 {
        return Rgb::SENTINEL;
    }
    let weighted = samples
        .iter()
        .fold(Vec3::ZERO, |acc, (color, score)| {
            acc + Vec3::new(color.r as f32, color.g as f32, color.b as f32) * *score
        });
    Rgb::from_channels(weighted / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use prism_capture::{Intrinsics, PixelBuffer};

    fn frame(position: Vec3, color: Rgb, timestamp: f64) -> CapturedFrame {
        CapturedFrame::new(
            PixelBuffer::solid(100, 100, color).unwrap(),
            Mat4::from_translation(position),
            Intrinsics::new(50.0, 50.0, 50.0, 50.0).unwrap(),
            timestamp,
        )
        .unwrap()
    }

    #[test]
    fn test_blend_weighted_two_to_one() {
        let c1 = Rgb::new(255, 0, 30);
        let c2 = Rgb::new(0, 255, 90);
        let blended = blend_weighted(&[(c1, 2.0), (c2, 1.0)]);
        assert_eq!(blended, Rgb::new(170, 85, 50));
    }

    #[test]
    fn test_blend_frames_at_double_distance() {
        // Scores 2/(0.99+0.01) and 2/(1.99+0.01): exactly 2:1.
        let index = FrameIndex::new(vec![
            frame(Vec3::new(0.0, 0.0, 0.99), Rgb::new(255, 0, 0), 0.0),
            frame(Vec3::new(0.0, 0.0, 1.99), Rgb::new(0, 0, 255), 1.0),
        ]);
        let fusion = ColorFusion::new(&index, FusionMode::Blend { frames: 3 }, 2.0);
        let fused = fusion.color_for(Vec3::ZERO, None);
        let expected = [170i32, 0, 85];
        let actual = [fused.color.r as i32, fused.color.g as i32, fused.color.b as i32];
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() <= 1, "{actual:?} vs {expected:?}");
        }
        assert!((fused.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_frame_confidence_is_its_score() {
        let index = FrameIndex::new(vec![frame(Vec3::new(0.0, 0.0, 7.99), Rgb::new(9, 9, 9), 0.0)]);
        let fusion = ColorFusion::new(&index, FusionMode::Blend { frames: 3 }, 2.0);
        let fused = fusion.color_for(Vec3::ZERO, None);
        assert_eq!(fused.color, Rgb::new(9, 9, 9));
        assert!((fused.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_single_best_picks_closest() {
        let index = FrameIndex::new(vec![
            frame(Vec3::new(0.0, 0.0, 3.0), Rgb::new(0, 0, 255), 0.0),
            frame(Vec3::new(0.0, 0.0, 1.0), Rgb::new(255, 0, 0), 1.0),
        ]);
        let fusion = ColorFusion::new(&index, FusionMode::SingleBest, 2.0);
        let fused = fusion.color_for(Vec3::ZERO, Some(Vec3::Z));
        assert_eq!(fused.color, Rgb::new(255, 0, 0));
        assert_eq!(fused.confidence, 1.0);
    }

    #[test]
    fn test_top_k_limits_blend() {
        let index = FrameIndex::new(vec![
            frame(Vec3::new(0.0, 0.0, 1.0), Rgb::new(200, 0, 0), 0.0),
            frame(Vec3::new(0.0, 0.0, 1.0), Rgb::new(200, 0, 0), 1.0),
            frame(Vec3::new(0.0, 0.0, 1.5), Rgb::new(0, 0, 200), 2.0),
        ]);
        let fusion = ColorFusion::new(&index, FusionMode::Blend { frames: 2 }, 2.0);
        assert_eq!(fusion.color_for(Vec3::ZERO, None).color, Rgb::new(200, 0, 0));
    }

    #[test]
    fn test_sentinel_when_nothing_visible() {
        let empty = FrameIndex::default();
        for mode in [FusionMode::SingleBest, FusionMode::Blend { frames: 3 }] {
            assert_eq!(
                ColorFusion::new(&empty, mode, 2.0).color_for(Vec3::ZERO, None),
                FusedColor::UNSEEN
            );
        }

        // Every frame either looks away or sees the point off-image.
        let invisible = FrameIndex::new(vec![
            frame(Vec3::new(0.0, 0.0, -1.0), Rgb::new(255, 0, 0), 0.0),
            frame(Vec3::new(5.0, 0.0, 1.0), Rgb::new(0, 255, 0), 1.0),
        ]);
        for mode in [FusionMode::SingleBest, FusionMode::Blend { frames: 3 }] {
            let fused = ColorFusion::new(&invisible, mode, 2.0).color_for(Vec3::ZERO, None);
            assert_eq!(fused.color, Rgb::SENTINEL);
            assert_eq!(fused.confidence, 0.0);
        }
    }

    #[test]
    fn test_frame_without_pixels_is_skipped() {
        let index = FrameIndex::new(vec![
            CapturedFrame::without_pixels(
                100,
                100,
                Mat4::from_translation(Vec3::new(0.0, 0.0, 0.5)),
                Intrinsics::new(50.0, 50.0, 50.0, 50.0).unwrap(),
                0.0,
            )
            .unwrap(),
            frame(Vec3::new(0.0, 0.0, 2.0), Rgb::new(0, 120, 0), 1.0),
        ]);
        let fusion = ColorFusion::new(&index, FusionMode::SingleBest, 2.0);
        assert_eq!(fusion.color_for(Vec3::ZERO, None).color, Rgb::new(0, 120, 0));
    }
}
