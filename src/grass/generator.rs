//! Blade field generation and patch partitioning.

use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::{normalize_or, Aabb};

use super::blade::{BladeStore, GpuBlade};
use super::patch::GrassPatch;

/// Per-blade attribute ranges, sampled uniformly.
#[derive(Clone, Debug, PartialEq)]
pub struct BladeShape {
    pub height: (f32, f32),
    pub width: (f32, f32),
    pub bending: (f32, f32),
}

impl Default for BladeShape {
    fn default() -> Self {
        Self {
            height: (0.6, 0.8),
            width: (0.06, 0.08),
            bending: (0.25, 0.3),
        }
    }
}

/// A ground triangle with per-vertex normals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundTriangle {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
}

impl GroundTriangle {
    /// Flat triangle with the face normal on every vertex.
    pub fn flat(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let n = normalize_or((b - a).cross(c - a), Vec3::Y);
        Self { positions: [a, b, c], normals: [n; 3] }
    }

    pub fn area(&self) -> f32 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a).length() * 0.5
    }
}

/// Seeded generator of straight, randomly oriented blades.
pub struct BladeFieldBuilder {
    shape: BladeShape,
    /// Blades per square world unit
    density: f32,
    rng: StdRng,
}

impl BladeFieldBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            shape: BladeShape::default(),
            density: 60.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_shape(mut self, shape: BladeShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density.max(0.0);
        self
    }

    fn range(&mut self, (lo, hi): (f32, f32)) -> f32 {
        if hi > lo { self.rng.random_range(lo..hi) } else { lo }
    }

    fn blade(&mut self, ground: Vec3, up: Vec3) -> GpuBlade {
        let orientation = self.rng.random::<f32>() * std::f32::consts::TAU;
        let height = self.range(self.shape.height);
        let width = self.range(self.shape.width);
        let bending = self.range(self.shape.bending);
        GpuBlade::straight(ground, up, orientation, height, width, bending)
    }

    /// Blades scattered over the XZ rectangle `[min, max]` at height `y`.
    pub fn rectangle(&mut self, min: Vec2, max: Vec2, y: f32) -> Vec<GpuBlade> {
        let size = (max - min).max(Vec2::ZERO);
        let count = (size.x * size.y * self.density).round() as usize;
        (0..count)
            .map(|_| {
                let x = min.x + self.rng.random::<f32>() * size.x;
                let z = min.y + self.rng.random::<f32>() * size.y;
                self.blade(Vec3::new(x, y, z), Vec3::Y)
            })
            .collect()
    }

    /// Blades scattered over a triangle mesh, up vectors interpolated from
    /// the vertex normals.
    pub fn triangles(&mut self, triangles: &[GroundTriangle]) -> Vec<GpuBlade> {
        let mut blades = Vec::new();
        for tri in triangles {
            let count = (tri.area() * self.density).round() as usize;
            for _ in 0..count {
                let (mut u, mut v) = (self.rng.random::<f32>(), self.rng.random::<f32>());
                if u + v > 1.0 {
                    u = 1.0 - u;
                    v = 1.0 - v;
                }
                let w = 1.0 - u - v;
                let [a, b, c] = tri.positions;
                let [na, nb, nc] = tri.normals;
                let ground = a * w + b * u + c * v;
                let up = normalize_or(na * w + nb * u + nc * v, Vec3::Y);
                blades.push(self.blade(ground, up));
            }
        }
        blades
    }
}

/// Partition blades into spatially coherent patches of at most
/// `max_per_patch` blades.
///
/// Groups are split at the median of their longest axis until small enough.
/// Each patch is re-centred on its bounds and gets a translation model
/// matrix, so blade positions are stored patch-local.
pub fn split_into_patches(blades: Vec<GpuBlade>, max_per_patch: usize) -> Vec<GrassPatch> {
    let max_per_patch = max_per_patch.max(1);
    let mut pending = vec![blades];
    let mut groups = Vec::new();

    while let Some(mut group) = pending.pop() {
        if group.is_empty() {
            continue;
        }
        if group.len() <= max_per_patch {
            groups.push(group);
            continue;
        }
        let axis = longest_axis(&group);
        group.sort_unstable_by(|a, b| a.ground[axis].total_cmp(&b.ground[axis]));
        let upper = group.split_off(group.len() / 2);
        pending.push(upper);
        pending.push(group);
    }

    groups.into_iter().map(recentre).collect()
}

fn longest_axis(blades: &[GpuBlade]) -> usize {
    let mut bounds = Aabb::EMPTY;
    for b in blades {
        bounds.expand(b.ground());
    }
    let size = bounds.size();
    if size.x >= size.y && size.x >= size.z {
        0
    } else if size.y >= size.z {
        1
    } else {
        2
    }
}

fn recentre(mut blades: Vec<GpuBlade>) -> GrassPatch {
    let mut bounds = Aabb::EMPTY;
    for b in &blades {
        bounds.expand(b.ground());
    }
    let center = bounds.center();
    for b in &mut blades {
        let ground = b.ground() - center;
        let (v1, v2) = (b.v1() - center, b.v2() - center);
        b.ground = ground.to_array();
        b.set_control_points(v1, v2);
    }
    GrassPatch::new(BladeStore::new(blades), Mat4::from_translation(center))
}
