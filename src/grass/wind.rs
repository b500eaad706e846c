//! Wind models and the per-frame wind generator.
//!
//! A [`WindModel`] is chosen once per frame and evaluated per blade by the
//! force kernel. [`WindGenerator`] drives it over time: a randomly
//! re-rolled gusting vector, or a point source that can follow an anchor.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::{normalize_or, LENGTH_EPSILON};

/// Upper bound of a directional gust magnitude
pub const MAX_WIND_MAGNITUDE: f32 = 8.0;

/// Wind acting on the field for one frame. `phase` is the accumulated wave
/// time that animates the gusts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum WindModel {
    #[default]
    None,
    Directional { velocity: Vec3, phase: f32 },
    Point { center: Vec3, phase: f32 },
    PointWithTangential { center: Vec3, phase: f32 },
}

impl WindModel {
    /// Unscaled wind displacement for one blade.
    ///
    /// `tip_offset` is `v2 - ground`; the caller multiplies the result by
    /// the blade's bending factor and the clamped time step.
    pub fn displacement(&self, ground: Vec3, tip_offset: Vec3, up: Vec3, height: f32) -> Vec3 {
        if height <= 0.0 {
            return Vec3::ZERO;
        }
        let windage_height = tip_offset.dot(up).abs() / height;
        let tip_dir = normalize_or(tip_offset, up);

        match *self {
            WindModel::None => Vec3::ZERO,
            WindModel::Directional { velocity, phase } => {
                let windage_dir = 1.0 - normalize_or(velocity, Vec3::ZERO).dot(tip_dir).abs();
                let p = ground;
                let wave = ((p.x + p.z) * 0.75 + phase).cos()
                    + ((p.x + p.y) * 0.5 + phase).sin()
                    + ((p.y + p.z) * 0.25 + phase).sin();
                let wave = 1.0 - (wave / 3.0).max(0.0);
                velocity * windage_dir * windage_height * wave * wave
            }
            WindModel::Point { center, phase } => {
                let d = ground - center;
                let dist = d.length();
                if dist <= LENGTH_EPSILON {
                    return Vec3::ZERO;
                }
                let dir = d / dist * 100.0;
                let attenuation = (1.0 - (dist * 0.2 + 1.0).log2() * 0.25).max(0.0);
                let wave = 1.0 - (dist * 0.4 - phase * 4.0).sin().max(0.0);
                dir * attenuation * windage_height * wave
            }
            WindModel::PointWithTangential { center, phase } => {
                let d = ground - center;
                let dist = d.length();
                if dist <= LENGTH_EPSILON {
                    return Vec3::ZERO;
                }
                let dir = d / dist;
                let tangent = normalize_or(dir.cross(up), Vec3::ZERO) * 6.0;
                let windage_dir = 1.0 - dir.dot(tip_dir).abs();
                let attenuation = (1.0 - (dist * 0.5 + 1.0).log2() * 0.25).max(0.0);
                let wave = (dist * 0.1 - phase * 1.5).sin().powi(3);
                let dir = dir * 40.0 + tangent * (1.0 - attenuation * attenuation) * 10.0;
                dir * windage_dir * attenuation * windage_height * wave
            }
        }
    }
}

/// Which model the generator emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WindKind {
    #[default]
    Directional,
    Point,
    PointWithTangential,
}

/// Time-varying wind source.
pub struct WindGenerator {
    kind: WindKind,
    /// Seconds between direction re-rolls, as a range
    direction_period: (f32, f32),
    /// Seconds between magnitude re-rolls, as a range
    magnitude_period: (f32, f32),
    next_direction_shift: f32,
    next_magnitude_shift: f32,
    since_direction_shift: f32,
    since_magnitude_shift: f32,
    direction: Vec3,
    magnitude: f32,
    velocity: Vec3,
    center: Vec3,
    anchor: Option<Vec3>,
    anchor_offset: Vec3,
    phase: f32,
    rng: StdRng,
}

impl WindGenerator {
    pub fn new(direction_period: (f32, f32), magnitude_period: (f32, f32), seed: u64) -> Self {
        Self {
            kind: WindKind::Directional,
            direction_period,
            magnitude_period,
            next_direction_shift: 0.0,
            next_magnitude_shift: 0.0,
            since_direction_shift: 0.0,
            since_magnitude_shift: 0.0,
            direction: Vec3::X,
            magnitude: 0.5,
            velocity: Vec3::ZERO,
            center: Vec3::ZERO,
            anchor: None,
            anchor_offset: Vec3::ZERO,
            phase: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn kind(&self) -> WindKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: WindKind) {
        self.kind = kind;
    }

    /// Make point sources follow `position + offset`.
    pub fn set_anchor(&mut self, position: Option<Vec3>, offset: Vec3) {
        self.anchor = position;
        self.anchor_offset = offset;
    }

    pub fn set_center(&mut self, center: Vec3) {
        self.center = center;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Advance by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        self.since_direction_shift += dt;
        self.since_magnitude_shift += dt;
        self.phase += dt;

        match self.kind {
            WindKind::Directional => {
                if self.since_direction_shift >= self.next_direction_shift {
                    self.since_direction_shift = 0.0;
                    let (lo, hi) = self.direction_period;
                    self.next_direction_shift = lo + self.rng.random::<f32>() * (hi - lo);
                    let phi = self.rng.random::<f32>() * std::f32::consts::TAU;
                    let tilt = self.rng.random::<f32>() - 0.5;
                    self.direction = normalize_or(Vec3::new(phi.sin(), tilt, phi.cos()), Vec3::X);
                    self.velocity = self.direction * self.magnitude;
                }
                if self.since_magnitude_shift >= self.next_magnitude_shift {
                    self.since_magnitude_shift = 0.0;
                    let (lo, hi) = self.magnitude_period;
                    self.next_magnitude_shift = lo + self.rng.random::<f32>() * (hi - lo);
                    self.magnitude = self.rng.random::<f32>() * MAX_WIND_MAGNITUDE;
                    self.velocity = self.direction * self.magnitude;
                }
            }
            WindKind::Point | WindKind::PointWithTangential => {
                if let Some(anchor) = self.anchor {
                    self.center = anchor + self.anchor_offset;
                }
            }
        }
    }

    /// Zero the wind and force both periods to re-roll on the next update.
    pub fn reset(&mut self) {
        self.velocity = Vec3::ZERO;
        self.next_direction_shift = 0.0;
        self.next_magnitude_shift = 0.0;
        self.since_direction_shift = f32::MAX;
        self.since_magnitude_shift = f32::MAX;
        self.phase = 0.0;
    }

    /// The model for the current frame.
    pub fn model(&self) -> WindModel {
        match self.kind {
            WindKind::Directional => WindModel::Directional { velocity: self.velocity, phase: self.phase },
            WindKind::Point => WindModel::Point { center: self.center, phase: self.phase },
            WindKind::PointWithTangential => {
                WindModel::PointWithTangential { center: self.center, phase: self.phase }
            }
        }
    }
}

impl Default for WindGenerator {
    fn default() -> Self {
        Self::new((5.0, 8.0), (1.0, 2.0), 0x5eed)
    }
}
