//! Mathematical utilities and data structures

pub mod aabb;
pub mod frustum;
pub mod sphere;

pub use aabb::Aabb;
pub use frustum::{Plane, Frustum};
pub use sphere::{GpuSphere, Sphere};

use glam::Vec3;

/// Squared length below which `normalize_or` treats a vector as zero
pub const NORMALIZE_EPSILON: f32 = 1e-12;

/// Length or distance below which a value counts as zero
pub const LENGTH_EPSILON: f32 = 1e-6;

/// Normalize `v`, or return `fallback` when `v` has (near) zero length
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq > NORMALIZE_EPSILON {
        v / len_sq.sqrt()
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_or_thresholds_squared_length() {
        // Length 1e-7 is below the squared threshold of 1e-12
        assert_eq!(normalize_or(Vec3::new(1e-7, 0.0, 0.0), Vec3::Y), Vec3::Y);
        let n = normalize_or(Vec3::new(0.0, 0.0, 1e-5), Vec3::Y);
        assert!((n - Vec3::Z).length() < 1e-6);
    }
}
