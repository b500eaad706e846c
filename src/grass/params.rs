//! Per-dispatch parameters and the GPU-ready force uniform.
//!
//! The uniform mirrors what a compute shader port of the force stage reads;
//! the CPU kernels take the richer Rust types directly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use super::wind::WindModel;

/// Most colliders a single patch dispatch considers.
pub const MAX_SPHERE_COLLIDERS: usize = 50;
/// Most inner (occluder) spheres per frame.
pub const MAX_INNER_SPHERES: usize = 150;
/// Largest simulation step; longer frames are clamped to this.
pub const MAX_TIME_STEP: f32 = 1.0;

/// Model transform of one patch with its derived matrices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchTransform {
    pub model: Mat4,
    pub inverse: Mat4,
    /// Inverse-transpose of the model's upper 3x3
    pub normal: Mat3,
}

impl PatchTransform {
    pub fn new(model: Mat4) -> Self {
        let inverse = model.inverse();
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self { model, inverse, normal }
    }

    pub fn from_translation(t: Vec3) -> Self {
        Self::new(Mat4::from_translation(t))
    }
}

impl Default for PatchTransform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

/// GPU uniform for the force stage (64 bytes, 16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuForceParams {
    /// xyz = wind velocity or source position, w = wave phase
    pub wind: [f32; 4],
    // -- 16 bytes --
    /// xyz = direction, w = strength
    pub gravity: [f32; 4],
    // -- 16 bytes --
    /// xyz = attraction point, w = strength
    pub gravity_point: [f32; 4],
    // -- 16 bytes --
    pub gravity_blend: f32,
    pub dt: f32,
    /// 0 = directional, 1 = point, 2 = point with tangential, 99 = none
    pub wind_type: u32,
    pub collider_count: u32,
    // -- 16 bytes --
    // Total: 64 bytes
}

impl GpuForceParams {
    pub fn wind_fields(wind: &WindModel) -> ([f32; 4], u32) {
        match *wind {
            WindModel::None => ([0.0; 4], 99),
            WindModel::Directional { velocity, phase } => (velocity.extend(phase).to_array(), 0),
            WindModel::Point { center, phase } => (center.extend(phase).to_array(), 1),
            WindModel::PointWithTangential { center, phase } => (center.extend(phase).to_array(), 2),
        }
    }
}
