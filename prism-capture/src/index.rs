//! Time-ordered collection of captured frames.

use crate::frame::{CapturedFrame, Projection};
use glam::Vec3;
use prism_data::Rgb;
use tracing::debug;

/// The frames of one scan snapshot, sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    frames: Vec<CapturedFrame>,
}

impl FrameIndex {
    /// Build an index; frames are stably sorted by timestamp.
    pub fn new(mut frames: Vec<CapturedFrame>) -> Self {
        frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        debug!("Indexed {} frames", frames.len());
        Self { frames }
    }

    /// All frames in timestamp order.
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Take the frames out, still in timestamp order.
    pub fn into_frames(self) -> Vec<CapturedFrame> {
        self.frames
    }

    /// Iterate frames in timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &CapturedFrame> {
        self.frames.iter()
    }

    /// Frame at `index` in timestamp order.
    pub fn get(&self, index: usize) -> Option<&CapturedFrame> {
        self.frames.get(index)
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when there are no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The frame whose timestamp is closest to `timestamp`.
    pub fn nearest_in_time(&self, timestamp: f64) -> Option<&CapturedFrame> {
        let split = self.frames.partition_point(|f| f.timestamp < timestamp);
        let after = self.frames.get(split);
        let before = split.checked_sub(1).and_then(|i| self.frames.get(i));
        match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp <= a.timestamp - timestamp {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        }
    }

    /// Project a world point into `frame`.
    pub fn project(&self, world: Vec3, frame: &CapturedFrame) -> Projection {
        frame.project(world)
    }

    /// World point seen at image coordinates `(x, y)` and `depth` meters in front of `frame`.
    pub fn unproject(&self, x: f32, y: f32, depth: f32, frame: &CapturedFrame) -> Vec3 {
        frame.unproject(x, y, depth)
    }

    /// Bilinear color at image coordinates, or the sentinel gray when the
    /// sample is out of bounds or the frame has no pixels.
    pub fn sample_color(&self, x: f32, y: f32, frame: &CapturedFrame) -> Rgb {
        frame.try_sample(x, y).unwrap_or(Rgb::SENTINEL)
    }
}

impl From<Vec<CapturedFrame>> for FrameIndex {
    fn from(frames: Vec<CapturedFrame>) -> Self {
        Self::new(frames)
    }
}

impl<'a> IntoIterator for &'a FrameIndex {
    type Item = &'a CapturedFrame;
    type IntoIter = std::slice::Iter<'a, CapturedFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Intrinsics, PixelBuffer};
    use glam::Mat4;

    fn frame(timestamp: f64, color: Rgb) -> CapturedFrame {
        CapturedFrame::new(
            PixelBuffer::solid(8, 8, color).unwrap(),
            Mat4::from_translation(Vec3::new(0.0, 0.0, 1.0)),
            Intrinsics::centered(8.0, 8, 8).unwrap(),
            timestamp,
        )
        .unwrap()
    }

    #[test]
    fn test_frames_sorted_by_time() {
        let index = FrameIndex::new(vec![
            frame(3.0, Rgb::new(3, 0, 0)),
            frame(1.0, Rgb::new(1, 0, 0)),
            frame(2.0, Rgb::new(2, 0, 0)),
        ]);
        let times: Vec<f64> = index.iter().map(|f| f.timestamp).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_nearest_in_time() {
        let index = FrameIndex::new(vec![
            frame(0.0, Rgb::SENTINEL),
            frame(1.0, Rgb::SENTINEL),
            frame(5.0, Rgb::SENTINEL),
        ]);
        assert_eq!(index.nearest_in_time(-3.0).unwrap().timestamp, 0.0);
        assert_eq!(index.nearest_in_time(2.9).unwrap().timestamp, 1.0);
        assert_eq!(index.nearest_in_time(3.1).unwrap().timestamp, 5.0);
        assert_eq!(index.nearest_in_time(9.0).unwrap().timestamp, 5.0);
        assert!(FrameIndex::default().nearest_in_time(0.0).is_none());
    }

    #[test]
    fn test_sample_color_falls_back_to_sentinel() {
        let index = FrameIndex::new(vec![frame(0.0, Rgb::new(0, 200, 0))]);
        let f = &index.frames()[0];
        let p = index.project(Vec3::ZERO, f);
        assert_eq!(index.sample_color(p.x, p.y, f), Rgb::new(0, 200, 0));
        assert_eq!(index.sample_color(100.0, 1.0, f), Rgb::SENTINEL);

        let behind = index.project(Vec3::new(0.0, 0.0, 3.0), f);
        assert_eq!(index.sample_color(behind.x, behind.y, f), Rgb::SENTINEL);
    }

    #[test]
    fn test_unproject_inverts_project() {
        let index = FrameIndex::new(vec![frame(0.0, Rgb::SENTINEL)]);
        let f = &index.frames()[0];
        let world = Vec3::new(0.1, -0.05, -0.4);
        let p = index.project(world, f);
        let depth = f.position().z - world.z;
        let back = index.unproject(p.x, p.y, depth, f);
        assert!(back.distance(world) < 1e-5, "{back:?}");
    }
}
