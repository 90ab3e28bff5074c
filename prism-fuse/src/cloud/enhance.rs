//! Perceptual color enhancement in HSV space.
//!
//! Indoor scans tend to come out uniformly gray, so faint tints in
//! near-white samples are exaggerated on purpose. Everything else goes
//! through a logistic contrast curve and a saturation boost.

use glam::Vec3;
use prism_data::Rgb;

/// Channels above this are "near white".
const NEAR_WHITE: f32 = 0.8;
/// Channels above this are "very near white".
const VERY_NEAR_WHITE: f32 = 0.9;
/// Steepness of the contrast S-curve.
const CONTRAST_STEEPNESS: f32 = 1.5;
/// Saturation multiplier for regular colors.
const SATURATION_BOOST: f32 = 1.3;

/// A color in HSV: hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Hsv {
    pub fn from_rgb(rgb: Vec3) -> Self {
        let max = rgb.max_element();
        let min = rgb.min_element();
        let delta = max - min;

        let h = if delta <= f32::EPSILON {
            0.0
        } else if max == rgb.x {
            60.0 * ((rgb.y - rgb.z) / delta).rem_euclid(6.0)
        } else if max == rgb.y {
            60.0 * ((rgb.z - rgb.x) / delta + 2.0)
        } else {
            60.0 * ((rgb.x - rgb.y) / delta + 4.0)
        };
        let s = if max <= 0.0 { 0.0 } else { delta / max };
        Self { h, s, v: max }
    }

    pub fn to_rgb(self) -> Vec3 {
        let c = self.v * self.s;
        let h = self.h.rem_euclid(360.0) / 60.0;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = self.v - c;
        Vec3::new(r + m, g + m, b + m)
    }

    fn saturate(self, factor: f32) -> Self {
        Self {
            s: (self.s * factor).min(1.0),
            ..self
        }
    }
}

/// Logistic contrast curve `1 / (1 + e^(-k(x - 0.5)))`.
///
/// Maps `[0, 1]` into roughly `[0.32, 0.68]`, so saturated extremes are
/// pulled toward mid-tones before the saturation boost.
fn contrast(x: f32) -> f32 {
    1.0 / (1.0 + (-CONTRAST_STEEPNESS * (x - 0.5)).exp())
}

/// Boost contrast and saturation of a fused color.
///
/// `confidence` does not modulate the effect yet; it is accepted so callers
/// do not change when it does.
pub fn enhance(color: Rgb, _confidence: f32) -> Rgb {
    let rgb = color.to_unit();

    let tint = if rgb.min_element() > VERY_NEAR_WHITE {
        Some((6.0, 8.0))
    } else if rgb.min_element() > NEAR_WHITE {
        Some((3.0, 4.0))
    } else {
        None
    };

    let enhanced = match tint {
        Some((deviation_gain, saturation_gain)) => {
            let mean = rgb.element_sum() / 3.0;
            let amplified = (Vec3::splat(mean) + (rgb - Vec3::splat(mean)) * deviation_gain)
                .clamp(Vec3::splat(0.2), Vec3::ONE);
            Hsv::from_rgb(amplified).saturate(saturation_gain).to_rgb()
        }
        None => {
            let curved = Vec3::new(contrast(rgb.x), contrast(rgb.y), contrast(rgb.z));
            Hsv::from_rgb(curved).saturate(SATURATION_BOOST).to_rgb()
        }
    };
    Rgb::from_unit(enhanced)
}
