//! View frustum for patch-level culling

use crate::core::types::{Vec3, Vec4, Mat4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix (Gribb/Hartmann).
    ///
    /// Assumes a `[0, 1]` clip depth range as produced by glam's `*_rh`
    /// projections, so the near plane is row 2 alone.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        Self {
            planes: [
                Self::normalize_plane(r2),      // near
                Self::normalize_plane(r3 - r2), // far
                Self::normalize_plane(r3 + r0), // left
                Self::normalize_plane(r3 - r0), // right
                Self::normalize_plane(r3 - r1), // top
                Self::normalize_plane(r3 + r1), // bottom
            ],
        }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        if len > 0.0 {
            Plane { normal: normal / len, distance: plane.w / len }
        } else {
            // Degenerate row: accept everything rather than cull everything
            Plane { normal: Vec3::ZERO, distance: 1.0 }
        }
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.aabb_outside_distance(aabb) == 0.0
    }

    /// How far the AABB lies outside the frustum: the largest distance of a
    /// p-vertex behind its plane, or 0 if the box intersects the frustum.
    pub fn aabb_outside_distance(&self, aabb: &Aabb) -> f32 {
        let mut outside = 0.0f32;
        for plane in &self.planes {
            // Find the corner most aligned with plane normal (p-vertex)
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            let d = plane.distance_to_point(p);
            if d < 0.0 {
                outside = outside.max(-d);
            }
        }
        outside
    }
}
