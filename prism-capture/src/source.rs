//! Frame sources: where captured frames come from.

use crate::frame::{CapturedFrame, FrameError, Intrinsics, PixelBuffer, PixelFormat};
use crate::index::FrameIndex;
use glam::Mat4;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Trait for sources that yield posed camera frames.
pub trait FrameSource {
    /// Get the next frame. Returns `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, FrameError>;

    /// Number of frames left, if known.
    fn remaining(&self) -> Option<usize>;
}

/// Decode an image file (PNG, JPEG, ...) into an RGBA8 pixel buffer.
pub fn load_frame_image(path: impl AsRef<Path>) -> Result<PixelBuffer, FrameError> {
    let path = path.as_ref();
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    debug!("Decoded {} ({}x{})", path.display(), width, height);
    PixelBuffer::packed(width, height, PixelFormat::Rgba8, image.into_raw())
}

/// Description of a frame stored as an image file plus its pose.
#[derive(Debug, Clone)]
pub struct FrameDescriptor {
    pub image: PathBuf,
    /// Camera to world transform.
    pub pose: Mat4,
    pub intrinsics: Intrinsics,
    pub timestamp: f64,
    /// Resolution the intrinsics were calibrated at, when it differs from
    /// the stored image (e.g. downscaled captures).
    pub intrinsics_resolution: Option<(u32, u32)>,
}

impl Intrinsics {
    /// Rescale to an image of a different resolution.
    pub fn scaled(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
        }
    }
}

/// Loads frames lazily from image files on disk.
pub struct ImageFileSource {
    pending: VecDeque<FrameDescriptor>,
    loaded: u64,
}

impl ImageFileSource {
    pub fn new(descriptors: impl IntoIterator<Item = FrameDescriptor>) -> Self {
        Self {
            pending: descriptors.into_iter().collect(),
            loaded: 0,
        }
    }

    /// Number of frames decoded so far.
    pub fn loaded(&self) -> u64 {
        self.loaded
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, FrameError> {
        let Some(descriptor) = self.pending.pop_front() else {
            return Ok(None);
        };
        let pixels = load_frame_image(&descriptor.image)?;
        let size = (pixels.width(), pixels.height());
        let intrinsics = match descriptor.intrinsics_resolution {
            Some(from) if from != size && from.0 > 0 && from.1 > 0 => {
                descriptor.intrinsics.scaled(from, size)
            }
            _ => descriptor.intrinsics,
        };
        self.loaded += 1;
        CapturedFrame::new(pixels, descriptor.pose, intrinsics, descriptor.timestamp).map(Some)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.pending.len())
    }
}

/// In-memory frames, e.g. handed over by a live capture session.
pub struct MemoryFrameSource {
    frames: VecDeque<CapturedFrame>,
}

impl MemoryFrameSource {
    pub fn new(frames: impl IntoIterator<Item = CapturedFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>, FrameError> {
        Ok(self.frames.pop_front())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.frames.len())
    }
}

/// Drain a source into a [`FrameIndex`].
pub fn collect_frames<S: FrameSource + ?Sized>(source: &mut S) -> Result<FrameIndex, FrameError> {
    let mut frames = Vec::with_capacity(source.remaining().unwrap_or(0));
    while let Some(frame) = source.next_frame()? {
        frames.push(frame);
    }
    info!("Collected {} frames", frames.len());
    Ok(FrameIndex::new(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use image::{Rgba, RgbaImage};
    use prism_data::Rgb;

    #[test]
    fn test_load_png_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let pixels = load_frame_image(&path).unwrap();
        assert_eq!((pixels.width(), pixels.height()), (4, 3));
        assert_eq!(pixels.format(), PixelFormat::Rgba8);
        assert_eq!(pixels.sample_bilinear(1.5, 0.5), Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn test_image_source_scales_intrinsics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbaImage::from_pixel(32, 24, Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let mut source = ImageFileSource::new([FrameDescriptor {
            image: path,
            pose: Mat4::from_translation(Vec3::Z),
            intrinsics: Intrinsics::new(100.0, 100.0, 64.0, 48.0).unwrap(),
            timestamp: 0.5,
            intrinsics_resolution: Some((128, 96)),
        }]);
        assert_eq!(source.remaining(), Some(1));

        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.intrinsics, Intrinsics::new(25.0, 25.0, 16.0, 12.0).unwrap());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let mut source = ImageFileSource::new([FrameDescriptor {
            image: PathBuf::from("/nonexistent/frame.png"),
            pose: Mat4::IDENTITY,
            intrinsics: Intrinsics::centered(10.0, 10, 10).unwrap(),
            timestamp: 0.0,
            intrinsics_resolution: None,
        }]);
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn test_collect_memory_frames() {
        let frame = |t| {
            CapturedFrame::new(
                PixelBuffer::solid(2, 2, Rgb::SENTINEL).unwrap(),
                Mat4::IDENTITY,
                Intrinsics::centered(1.0, 2, 2).unwrap(),
                t,
            )
            .unwrap()
        };
        let mut source = MemoryFrameSource::new([frame(2.0), frame(1.0)]);
        let index = collect_frames(&mut source).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.frames()[0].timestamp, 1.0);
    }
}
