//! Blade records and the blade state store.
//!
//! A blade is a quadratic curve from its ground anchor through control
//! point `v1` to the tip `v2`. The record keeps the GPU-packed layout
//! (four `vec4`s) so the store can be uploaded to a renderer unchanged.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};

use crate::core::{Error, Result};
use crate::math::{normalize_or, Aabb};

/// One grass blade (64 bytes, 16-byte aligned).
/// Field order matches the `pos/v1/v2/attr` storage buffers.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuBlade {
    pub ground: [f32; 3],
    /// Yaw around the up axis in radians
    pub orientation: f32,
    // -- 16 bytes --
    pub v1: [f32; 3],
    pub height: f32,
    // -- 16 bytes --
    pub v2: [f32; 3],
    pub width: f32,
    // -- 16 bytes --
    pub up: [f32; 3],
    /// Flexibility in 0..1 (0 = rigid)
    pub bending: f32,
    // -- 16 bytes --
    // Total: 64 bytes
}

impl GpuBlade {
    /// A blade at rest, standing straight along `up`.
    pub fn straight(ground: Vec3, up: Vec3, orientation: f32, height: f32, width: f32, bending: f32) -> Self {
        let up = normalize_or(up, Vec3::Y);
        let tip = ground + up * height;
        Self {
            ground: ground.to_array(),
            orientation,
            v1: tip.to_array(),
            height,
            v2: tip.to_array(),
            width,
            up: up.to_array(),
            bending: bending.clamp(0.0, 1.0),
        }
    }

    pub fn ground(&self) -> Vec3 {
        Vec3::from_array(self.ground)
    }

    pub fn v1(&self) -> Vec3 {
        Vec3::from_array(self.v1)
    }

    pub fn v2(&self) -> Vec3 {
        Vec3::from_array(self.v2)
    }

    pub fn up(&self) -> Vec3 {
        Vec3::from_array(self.up)
    }

    pub fn set_control_points(&mut self, v1: Vec3, v2: Vec3) {
        self.v1 = v1.to_array();
        self.v2 = v2.to_array();
    }

    /// Blade frame in the blade's own (model) space.
    pub fn frame(&self) -> BladeFrame {
        BladeFrame::from_orientation(self.up(), self.orientation)
    }
}

/// Local frame of a blade: up, the width axis (`direction`) and the face
/// normal the blade bends along (`front`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BladeFrame {
    pub up: Vec3,
    pub direction: Vec3,
    pub front: Vec3,
}

impl BladeFrame {
    /// Derive the frame from the up vector and yaw using an arbitrary helper
    /// vector that is never parallel to a unit `up` for all angles.
    pub fn from_orientation(up: Vec3, orientation: f32) -> Self {
        let (sd, cd) = orientation.sin_cos();
        let helper = normalize_or(Vec3::new(sd, sd + cd, cd), Vec3::X);
        let up = normalize_or(up, Vec3::Y);
        let direction = normalize_or(up.cross(helper), up.any_orthonormal_vector());
        let front = normalize_or(up.cross(direction), direction.cross(up));
        Self { up, direction, front }
    }

    /// Transform into world space with a normal matrix, re-normalizing.
    pub fn transformed(&self, normal_matrix: &Mat3) -> Self {
        Self {
            up: normalize_or(*normal_matrix * self.up, self.up),
            direction: normalize_or(*normal_matrix * self.direction, self.direction),
            front: normalize_or(*normal_matrix * self.front, self.front),
        }
    }
}

/// Persistent per-blade state of one patch plus a debug scratch array.
#[derive(Clone, Debug, Default)]
pub struct BladeStore {
    blades: Vec<GpuBlade>,
    debug: Vec<[f32; 4]>,
}

impl BladeStore {
    pub fn new(blades: Vec<GpuBlade>) -> Self {
        let debug = vec![[0.0; 4]; blades.len()];
        Self { blades, debug }
    }

    /// Build a store from the four packed `vec4` streams used by GPU loaders
    /// (`xyz ground + yaw`, `xyz v1 + height`, `xyz v2 + width`, `xyz up + bend`).
    pub fn from_packed(
        positions: &[[f32; 4]],
        v1: &[[f32; 4]],
        v2: &[[f32; 4]],
        attributes: &[[f32; 4]],
    ) -> Result<Self> {
        let n = positions.len();
        if v1.len() != n || v2.len() != n || attributes.len() != n {
            return Err(Error::Capacity(format!(
                "blade stream lengths differ: pos={} v1={} v2={} attr={}",
                n, v1.len(), v2.len(), attributes.len()
            )));
        }

        let blades = (0..n)
            .map(|i| GpuBlade {
                ground: [positions[i][0], positions[i][1], positions[i][2]],
                orientation: positions[i][3],
                v1: [v1[i][0], v1[i][1], v1[i][2]],
                height: v1[i][3],
                v2: [v2[i][0], v2[i][1], v2[i][2]],
                width: v2[i][3],
                up: [attributes[i][0], attributes[i][1], attributes[i][2]],
                bending: attributes[i][3],
            })
            .collect();
        Ok(Self::new(blades))
    }

    pub fn len(&self) -> usize {
        self.blades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blades.is_empty()
    }

    pub fn blades(&self) -> &[GpuBlade] {
        &self.blades
    }

    pub fn blades_mut(&mut self) -> &mut [GpuBlade] {
        &mut self.blades
    }

    pub fn debug(&self) -> &[[f32; 4]] {
        &self.debug
    }

    /// Split borrow for kernels that write both blades and scratch.
    pub fn parts_mut(&mut self) -> (&mut [GpuBlade], &mut [[f32; 4]]) {
        (&mut self.blades, &mut self.debug)
    }

    /// Local-space bounds: ground positions grown by each blade's height.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for blade in &self.blades {
            let reach = Vec3::splat(blade.height);
            aabb.expand(blade.ground() - reach);
            aabb.expand(blade.ground() + reach);
        }
        if aabb.is_empty() { Aabb::new(Vec3::ZERO, Vec3::ZERO) } else { aabb }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blades)
    }
}
