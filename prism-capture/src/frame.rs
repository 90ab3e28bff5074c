//! Captured frame types: pinhole intrinsics, pixel buffers and poses.

use glam::{Mat4, Vec3};
use prism_data::Rgb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while building or loading frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Image has zero size: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("Pixel buffer too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },

    #[error("Row stride {stride} is smaller than {width} pixels * 4 bytes")]
    InvalidStride { stride: usize, width: u32 },

    #[error("Invalid intrinsics: focal lengths must be positive (fx={fx}, fy={fy})")]
    InvalidIntrinsics { fx: f32, fy: f32 },

    #[error("Camera transform is not invertible")]
    SingularPose,

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pinhole camera parameters in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Validated intrinsics; focal lengths must be positive.
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Result<Self, FrameError> {
        let intrinsics = Self { fx, fy, cx, cy };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Square pixels with the principal point at the image center.
    pub fn centered(focal: f32, width: u32, height: u32) -> Result<Self, FrameError> {
        Self::new(focal, focal, width as f32 / 2.0, height as f32 / 2.0)
    }

    /// Reject non-positive focal lengths.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.fx > 0.0 && self.fy > 0.0 {
            Ok(())
        } else {
            Err(FrameError::InvalidIntrinsics {
                fx: self.fx,
                fy: self.fy,
            })
        }
    }
}

/// Channel order of a 4-byte-per-pixel buffer.
///
/// Camera pipelines hand out both orders for the same kind of buffer, so the
/// order always travels with the pixels instead of being assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Byte offsets of the red, green and blue channels within a pixel.
    pub const fn channel_offsets(self) -> [usize; 3] {
        match self {
            Self::Rgba8 => [0, 1, 2],
            Self::Bgra8 => [2, 1, 0],
        }
    }

    /// Detect the order from a platform bitmap-info style flag:
    /// little-endian 32-bit with alpha first stores pixels as BGRA.
    pub const fn detect(byte_order_little: bool, alpha_first: bool) -> Self {
        if byte_order_little && alpha_first {
            Self::Bgra8
        } else {
            Self::Rgba8
        }
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgba8" | "rgba" => Ok(Self::Rgba8),
            "bgra8" | "bgra" => Ok(Self::Bgra8),
            other => Err(format!("unknown pixel format: {other}")),
        }
    }
}

/// An 8-bit, 4-channel, row-major image.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    row_stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes. `row_stride` is the byte distance between rows.
    pub fn new(
        width: u32,
        height: u32,
        row_stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyImage { width, height });
        }
        if row_stride < width as usize * 4 {
            return Err(FrameError::InvalidStride {
                stride: row_stride,
                width,
            });
        }
        let needed = row_stride * (height as usize - 1) + width as usize * 4;
        if data.len() < needed {
            return Err(FrameError::BufferTooShort {
                needed,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            row_stride,
            format,
            data,
        })
    }

    /// Tightly packed rows.
    pub fn packed(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        Self::new(width, height, width as usize * 4, format, data)
    }

    /// A single-color image.
    pub fn solid(width: u32, height: u32, color: Rgb) -> Result<Self, FrameError> {
        let data = [color.r, color.g, color.b, 255].repeat(width as usize * height as usize);
        Self::packed(width, height, PixelFormat::Rgba8, data)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channel order of the stored bytes.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Color at integer pixel coordinates, honoring the channel order.
    /// Callers guarantee `x < width` and `y < height`.
    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        let base = y as usize * self.row_stride + x as usize * 4;
        let [r, g, b] = self.format.channel_offsets();
        Vec3::new(
            self.data[base + r] as f32,
            self.data[base + g] as f32,
            self.data[base + b] as f32,
        )
    }

    /// Bilinear interpolation of the 2x2 neighborhood around `(x, y)`.
    ///
    /// Returns `None` outside `[0, width-1) x [0, height-1)`.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> Option<Rgb> {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        if !(x >= 0.0 && x < max_x && y >= 0.0 && y < max_y) {
            return None;
        }
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.pixel(x0, y0) * (1.0 - fx) + self.pixel(x0 + 1, y0) * fx;
        let bottom = self.pixel(x0, y0 + 1) * (1.0 - fx) + self.pixel(x0 + 1, y0 + 1) * fx;
        Some(Rgb::from_channels(top * (1.0 - fy) + bottom * fy))
    }
}

/// Where a world point lands on a frame's image plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub x: f32,
    pub y: f32,
    /// Camera-space depth is not negative; `x`/`y` are NaN.
    pub behind: bool,
}

impl Projection {
    /// In front of the camera and within `[0, width) x [0, height)`.
    pub fn in_image(&self, width: u32, height: u32) -> bool {
        !self.behind
            && self.x >= 0.0
            && self.x < width as f32
            && self.y >= 0.0
            && self.y < height as f32
    }
}

/// One timestamped camera sample.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub timestamp: f64,
    /// Camera to world transform; the camera looks down its local -z.
    pose: Mat4,
    /// World to camera, the inverse of `pose`.
    view: Mat4,
    pub intrinsics: Intrinsics,
    width: u32,
    height: u32,
    pixels: Option<PixelBuffer>,
}

impl CapturedFrame {
    /// A frame sized by its pixel buffer. Fails on a singular pose.
    pub fn new(
        pixels: PixelBuffer,
        pose: Mat4,
        intrinsics: Intrinsics,
        timestamp: f64,
    ) -> Result<Self, FrameError> {
        let (width, height) = (pixels.width(), pixels.height());
        Self::build(Some(pixels), width, height, pose, intrinsics, timestamp)
    }

    /// A frame whose pixel buffer is no longer available. It still scores,
    /// but every sample falls back to the sentinel.
    pub fn without_pixels(
        width: u32,
        height: u32,
        pose: Mat4,
        intrinsics: Intrinsics,
        timestamp: f64,
    ) -> Result<Self, FrameError> {
        Self::build(None, width, height, pose, intrinsics, timestamp)
    }

    fn build(
        pixels: Option<PixelBuffer>,
        width: u32,
        height: u32,
        pose: Mat4,
        intrinsics: Intrinsics,
        timestamp: f64,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyImage { width, height });
        }
        intrinsics.validate()?;
        if pose.determinant().abs() <= f32::EPSILON {
            return Err(FrameError::SingularPose);
        }
        Ok(Self {
            timestamp,
            pose,
            view: pose.inverse(),
            intrinsics,
            width,
            height,
            pixels,
        })
    }

    /// Camera-to-world transform.
    pub fn pose(&self) -> Mat4 {
        self.pose
    }

    /// Camera center in world space (translation column of the pose).
    pub fn position(&self) -> Vec3 {
        self.pose.w_axis.truncate()
    }

    /// Image size `(width, height)` the intrinsics refer to.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Decoded pixels, if the frame has any.
    pub fn pixels(&self) -> Option<&PixelBuffer> {
        self.pixels.as_ref()
    }

    /// Pinhole projection: `u = -x/z*fx + cx`, `v = -y/z*fy + cy`.
    pub fn project(&self, world: Vec3) -> Projection {
        let p = self.view.transform_point3(world);
        if p.z >= 0.0 {
            return Projection {
                x: f32::NAN,
                y: f32::NAN,
                behind: true,
            };
        }
        let k = &self.intrinsics;
        Projection {
            x: -p.x / p.z * k.fx + k.cx,
            y: -p.y / p.z * k.fy + k.cy,
            behind: false,
        }
    }

    /// Inverse of [`project`](Self::project) at `depth` meters in front of the camera.
    pub fn unproject(&self, x: f32, y: f32, depth: f32) -> Vec3 {
        let k = &self.intrinsics;
        let camera = Vec3::new((x - k.cx) / k.fx * depth, (y - k.cy) / k.fy * depth, -depth);
        self.pose.transform_point3(camera)
    }

    /// Bilinear sample at image coordinates, or `None` when the point is
    /// out of bounds or the buffer is unavailable.
    pub fn try_sample(&self, x: f32, y: f32) -> Option<Rgb> {
        self.pixels.as_ref()?.sample_bilinear(x, y)
    }

    /// Project and sample in one step.
    pub fn sample_world(&self, world: Vec3) -> Option<Rgb> {
        let projection = self.project(world);
        if projection.behind {
            return None;
        }
        self.try_sample(projection.x, projection.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gradient(format: PixelFormat) -> PixelBuffer {
        // 2x2: red increases with x, green with y, blue fixed.
        let px = |r: u8, g: u8| match format {
            PixelFormat::Rgba8 => [r, g, 40, 255],
            PixelFormat::Bgra8 => [40, g, r, 255],
        };
        let data = [px(0, 0), px(200, 0), px(0, 100), px(200, 100)].concat();
        PixelBuffer::packed(2, 2, format, data).unwrap()
    }

    fn frame_at(position: Vec3) -> CapturedFrame {
        let pixels = PixelBuffer::solid(100, 100, Rgb::new(255, 0, 0)).unwrap();
        let intrinsics = Intrinsics::new(50.0, 50.0, 50.0, 50.0).unwrap();
        CapturedFrame::new(pixels, Mat4::from_translation(position), intrinsics, 0.0).unwrap()
    }

    #[test]
    fn test_bilinear_center_of_quad() {
        let buffer = gradient(PixelFormat::Rgba8);
        // Only [0, 1) is sampleable on a 2x2 image.
        let c = buffer.sample_bilinear(0.5, 0.5).unwrap();
        assert_eq!(c, Rgb::new(100, 50, 40));
        assert_eq!(buffer.sample_bilinear(0.0, 0.0).unwrap(), Rgb::new(0, 0, 40));
    }

    #[test]
    fn test_bgra_matches_rgba() {
        let rgba = gradient(PixelFormat::Rgba8).sample_bilinear(0.25, 0.75);
        let bgra = gradient(PixelFormat::Bgra8).sample_bilinear(0.25, 0.75);
        assert_eq!(rgba, bgra);
        assert_eq!(rgba.unwrap(), Rgb::new(50, 75, 40));
    }

    #[test]
    fn test_sample_out_of_bounds() {
        let buffer = gradient(PixelFormat::Rgba8);
        assert_eq!(buffer.sample_bilinear(1.0, 0.0), None);
        assert_eq!(buffer.sample_bilinear(-0.1, 0.5), None);
        assert_eq!(buffer.sample_bilinear(f32::NAN, 0.5), None);
    }

    #[test]
    fn test_row_stride_padding() {
        // 1 pixel of padding per row.
        let data = vec![
            10, 20, 30, 255, 10, 20, 30, 255, 0, 0, 0, 0, //
            10, 20, 30, 255, 10, 20, 30, 255, 0, 0, 0, 0,
        ];
        let buffer = PixelBuffer::new(2, 2, 12, PixelFormat::Rgba8, data).unwrap();
        assert_eq!(buffer.sample_bilinear(0.5, 0.5), Some(Rgb::new(10, 20, 30)));
    }

    #[test]
    fn test_buffer_validation() {
        assert!(matches!(
            PixelBuffer::packed(0, 4, PixelFormat::Rgba8, vec![]),
            Err(FrameError::EmptyImage { .. })
        ));
        assert!(matches!(
            PixelBuffer::packed(2, 2, PixelFormat::Rgba8, vec![0; 15]),
            Err(FrameError::BufferTooShort { needed: 16, .. })
        ));
        assert!(matches!(
            PixelBuffer::new(2, 2, 4, PixelFormat::Rgba8, vec![0; 16]),
            Err(FrameError::InvalidStride { .. })
        ));
        assert!(Intrinsics::new(0.0, 1.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_project_center_and_behind() {
        let frame = frame_at(Vec3::new(0.0, 0.0, 1.0));
        let center = frame.project(Vec3::ZERO);
        assert!(!center.behind);
        assert_relative_eq!(center.x, 50.0);
        assert_relative_eq!(center.y, 50.0);
        assert!(center.in_image(100, 100));

        let behind = frame.project(Vec3::new(0.0, 0.0, 2.0));
        assert!(behind.behind);
        assert!(!behind.in_image(100, 100));
        assert_eq!(frame.sample_world(Vec3::new(0.0, 0.0, 2.0)), None);
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let pose = Mat4::from_translation(Vec3::new(0.3, -0.2, 2.0))
            * Mat4::from_rotation_y(0.4)
            * Mat4::from_rotation_x(-0.2);
        let frame = CapturedFrame::without_pixels(
            640,
            480,
            pose,
            Intrinsics::new(500.0, 480.0, 320.0, 240.0).unwrap(),
            0.0,
        )
        .unwrap();

        for camera_point in [
            Vec3::new(0.1, 0.2, -1.5),
            Vec3::new(-0.4, 0.05, -2.2),
            Vec3::new(0.0, 0.0, -0.7),
        ] {
            let world = pose.transform_point3(camera_point);
            let projection = frame.project(world);
            assert!(projection.in_image(640, 480));
            let back = frame.unproject(projection.x, projection.y, -camera_point.z);
            assert_relative_eq!(back.x, world.x, epsilon = 1e-4);
            assert_relative_eq!(back.y, world.y, epsilon = 1e-4);
            assert_relative_eq!(back.z, world.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_missing_pixels_never_sample() {
        let frame = CapturedFrame::without_pixels(
            10,
            10,
            Mat4::IDENTITY,
            Intrinsics::centered(10.0, 10, 10).unwrap(),
            0.0,
        )
        .unwrap();
        assert_eq!(frame.try_sample(5.0, 5.0), None);
        assert_eq!(frame.position(), Vec3::ZERO);
    }

    #[test]
    fn test_detect_pixel_format() {
        assert_eq!(PixelFormat::detect(true, true), PixelFormat::Bgra8);
        assert_eq!(PixelFormat::detect(false, false), PixelFormat::Rgba8);
        assert_eq!("BGRA8".parse::<PixelFormat>().unwrap(), PixelFormat::Bgra8);
    }
}
