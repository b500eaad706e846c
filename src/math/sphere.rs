//! Bounding sphere used for colliders and inner-sphere occluders

use bytemuck::{Pod, Zeroable};

use crate::core::types::Vec3;
use super::aabb::Aabb;

/// Sphere given by center and radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Sphere/AABB overlap via closest-point distance (Arvo)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.distance_squared_to_point(self.center) <= self.radius * self.radius
    }
}

/// GPU layout of a sphere (16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct GpuSphere {
    pub center: [f32; 3],
    pub radius: f32,
}

impl From<Sphere> for GpuSphere {
    fn from(s: Sphere) -> Self {
        Self { center: s.center.to_array(), radius: s.radius }
    }
}
