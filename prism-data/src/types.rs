//! Core value types for colored point clouds.
//!
//! Positions and normals are plain `glam::Vec3`; a normal of `Vec3::ZERO`
//! means "no normal available".

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A 3D position (float32).
pub type Vertex3 = Vec3;

/// A unit surface normal, or `Vec3::ZERO` when undefined.
pub type Normal3 = Vec3;

/// Returns the normal if it is defined (non-zero).
pub fn defined_normal(normal: Normal3) -> Option<Vec3> {
    if normal.length_squared() > 0.0 {
        Some(normal)
    } else {
        None
    }
}

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Neutral gray substituted whenever no valid color sample exists.
    pub const SENTINEL: Rgb = Rgb::new(128, 128, 128);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels as floats in the 0-1 range.
    pub fn to_unit(self) -> Vec3 {
        Vec3::new(self.r as f32, self.g as f32, self.b as f32) / 255.0
    }

    /// Build from 0-1 floats, rounding and clamping each channel.
    pub fn from_unit(color: Vec3) -> Self {
        Self::from_channels(color * 255.0)
    }

    /// Build from 0-255 floats, rounding and clamping each channel.
    pub fn from_channels(channels: Vec3) -> Self {
        let quantize = |c: f32| c.round().clamp(0.0, 255.0) as u8;
        Self {
            r: quantize(channels.x),
            g: quantize(channels.y),
            b: quantize(channels.z),
        }
    }

    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::SENTINEL
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }
}

/// One output point of the fusion pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColoredPoint {
    /// Position in world space.
    pub position: Vec3,
    /// Fused color.
    pub color: Rgb,
    /// Relative sampling quality of `color` (0-1). Not a depth confidence.
    pub confidence: f32,
}

impl ColoredPoint {
    pub fn new(position: Vec3, color: Rgb, confidence: f32) -> Self {
        Self {
            position,
            color,
            confidence,
        }
    }

    /// A gray point with zero confidence, used when no frame sees `position`.
    pub fn unseen(position: Vec3) -> Self {
        Self {
            position,
            color: Rgb::SENTINEL,
            confidence: 0.0,
        }
    }
}

impl Default for ColoredPoint {
    fn default() -> Self {
        Self::unseen(Vec3::ZERO)
    }
}
