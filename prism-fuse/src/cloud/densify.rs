//! Jitter-based point densification.
//!
//! Synthesized points are NOT measured geometry: they are random offsets
//! around a real surface point and carry [`Provenance::Jittered`].

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Per-axis jitter half-width at level 0, in meters.
pub const BASE_JITTER: f32 = 0.005;
/// Children emitted at level 0.
pub const BASE_CHILDREN: u32 = 4;

/// Where a surface point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// A mesh vertex.
    Measured,
    /// Synthesized by jittering a measured point at the given level.
    Jittered { level: u32 },
}

/// A world-space point awaiting color fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub provenance: Provenance,
}

impl SurfacePoint {
    pub fn measured(position: Vec3, normal: Option<Vec3>) -> Self {
        Self {
            position,
            normal,
            provenance: Provenance::Measured,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.provenance, Provenance::Jittered { .. })
    }
}

/// Jitter half-width for a level: `0.005 / (level + 1)`.
pub fn jitter_scale(level: u32) -> f32 {
    BASE_JITTER / (level + 1) as f32
}

/// Children emitted at a level: `floor(4 / (level + 1))`.
pub fn children_at(level: u32) -> usize {
    (BASE_CHILDREN / (level + 1)) as usize
}

/// Expands measured points into jittered neighborhoods.
///
/// Each level emits its children around the original point with a smaller
/// jitter, so with `max_level = 2` one point becomes at most 1 + 4 + 2.
pub struct Densifier<R = StdRng> {
    max_level: u32,
    rng: R,
}

impl Densifier<StdRng> {
    /// Seeded for reproducible output, or from OS entropy.
    pub fn new(max_level: u32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(max_level, rng)
    }
}

impl<R: Rng> Densifier<R> {
    pub fn with_rng(max_level: u32, rng: R) -> Self {
        Self { max_level, rng }
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Upper bound of points produced per input point, the input included.
    pub fn max_points_per_input(&self) -> usize {
        1 + (0..self.max_level).map(children_at).sum::<usize>()
    }

    /// The point followed by its synthesized neighbors.
    pub fn densify(&mut self, point: SurfacePoint) -> Vec<SurfacePoint> {
        let mut out = Vec::with_capacity(self.max_points_per_input());
        self.densify_into(point, &mut out);
        out
    }

    /// Like [`densify`](Self::densify) but appends to `out`.
    pub fn densify_into(&mut self, point: SurfacePoint, out: &mut Vec<SurfacePoint>) {
        out.push(point);
        self.expand(point, 0, out);
    }

    fn expand(&mut self, parent: SurfacePoint, level: u32, out: &mut Vec<SurfacePoint>) {
        if level >= self.max_level {
            return;
        }
        let j = jitter_scale(level);
        for _ in 0..children_at(level) {
            let offset = Vec3::new(
                self.rng.gen_range(-j..=j),
                self.rng.gen_range(-j..=j),
                self.rng.gen_range(-j..=j),
            );
            out.push(SurfacePoint {
                position: parent.position + offset,
                normal: parent.normal,
                provenance: Provenance::Jittered { level },
            });
        }
        self.expand(parent, level + 1, out);
    }
}
