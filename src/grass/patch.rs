//! Grass patches: the unit of dispatch.
//!
//! A patch is a spatially coherent group of blades sharing one model
//! matrix, one pressure block, one visible-index list and one draw record.

use glam::{Mat4, Vec3};

use crate::math::{Aabb, Frustum, Sphere};

use super::blade::BladeStore;
use super::indirect::DrawElementsIndirect;
use super::params::{PatchTransform, MAX_SPHERE_COLLIDERS};
use super::visibility::VisibleIndexList;

/// Patches this far (world units) outside the frustum still animate.
pub const FORCE_MARGIN: f32 = 2.0;

/// Per-frame classification of a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchVisibility {
    /// Run the culling stage
    pub visible: bool,
    /// Run the force stage
    pub force_visible: bool,
}

pub struct GrassPatch {
    pub(crate) blades: BladeStore,
    transform: PatchTransform,
    bounds: Aabb,
    pub(crate) visible: VisibleIndexList,
    pub(crate) draw: DrawElementsIndirect,
    pub(crate) state: PatchVisibility,
}

impl GrassPatch {
    pub fn new(blades: BladeStore, model: Mat4) -> Self {
        let bounds = blades.bounds();
        let visible = VisibleIndexList::with_capacity(blades.len());
        Self {
            blades,
            transform: PatchTransform::new(model),
            bounds,
            visible,
            draw: DrawElementsIndirect::default(),
            state: PatchVisibility::default(),
        }
    }

    pub fn blades(&self) -> &BladeStore {
        &self.blades
    }

    pub fn len(&self) -> usize {
        self.blades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blades.is_empty()
    }

    pub fn transform(&self) -> &PatchTransform {
        &self.transform
    }

    pub fn set_model(&mut self, model: Mat4) {
        self.transform = PatchTransform::new(model);
    }

    /// Local-space bounds of the blades.
    pub fn local_bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn visible_list(&self) -> &VisibleIndexList {
        &self.visible
    }

    pub fn draw_record(&self) -> DrawElementsIndirect {
        self.draw
    }

    /// Classification from the last `classify` call.
    pub fn visibility(&self) -> PatchVisibility {
        self.state
    }

    /// World-space bounds, grown vertically by the height field's range.
    pub fn world_bounds(&self, height_scale: Option<f32>) -> Aabb {
        let local = match height_scale {
            Some(scale) => self.bounds.inflated(Vec3::new(0.0, scale.abs(), 0.0)),
            None => self.bounds,
        };
        local.transformed(&self.transform.model)
    }

    /// Decide which stages run for this patch this frame.
    pub fn classify(&mut self, frustum: &Frustum, height_scale: Option<f32>) -> PatchVisibility {
        let outside = frustum.aabb_outside_distance(&self.world_bounds(height_scale));
        self.state = PatchVisibility {
            visible: outside == 0.0,
            force_visible: outside < FORCE_MARGIN,
        };
        self.state
    }

    /// Colliders touching this patch, at most `MAX_SPHERE_COLLIDERS`.
    pub fn filter_colliders(&self, colliders: &[Sphere], height_scale: Option<f32>) -> Vec<Sphere> {
        let bounds = self.world_bounds(height_scale);
        let mut hits: Vec<Sphere> = colliders
            .iter()
            .filter(|s| s.intersects_aabb(&bounds))
            .copied()
            .collect();
        if hits.len() > MAX_SPHERE_COLLIDERS {
            log::debug!(
                "Patch touches {} colliders, keeping {}",
                hits.len(),
                MAX_SPHERE_COLLIDERS
            );
            hits.truncate(MAX_SPHERE_COLLIDERS);
        }
        hits
    }

    /// Reset the outputs of a patch that skipped culling this frame.
    pub(crate) fn clear_outputs(&mut self) {
        self.visible.reset();
        self.draw.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::Camera;
    use crate::grass::blade::GpuBlade;
    use glam::UVec2;

    fn patch_at(translation: Vec3) -> GrassPatch {
        let blades = (0..4)
            .map(|i| GpuBlade::straight(Vec3::new(i as f32, 0.0, 0.0), Vec3::Y, 0.0, 1.0, 0.05, 0.5))
            .collect();
        GrassPatch::new(BladeStore::new(blades), Mat4::from_translation(translation))
    }

    fn frustum() -> Frustum {
        let camera = Camera::look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::new(0.0, 0.0, -5.0), Vec3::Y);
        Frustum::from_view_projection(&camera.frame_view(UVec2::new(64, 64)).view_proj)
    }

    #[test]
    fn test_bounds() {
        let p = patch_at(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(p.local_bounds().min, Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(p.local_bounds().max, Vec3::new(4.0, 1.0, 1.0));
        let world = p.world_bounds(Some(3.0));
        assert_eq!(world.min, Vec3::new(9.0, -4.0, -1.0));
        assert_eq!(world.max, Vec3::new(14.0, 4.0, 1.0));
    }

    #[test]
    fn test_classify_in_view() {
        let mut p = patch_at(Vec3::new(-1.5, 0.0, -5.0));
        let v = p.classify(&frustum(), None);
        assert!(v.visible && v.force_visible);
        assert_eq!(p.visibility(), v);
    }

    #[test]
    fn test_classify_just_behind_camera() {
        // Box spans z in [5.5, 7.5], about 1.1 units outside the frustum
        let mut p = patch_at(Vec3::new(-1.5, 0.0, 6.5));
        let v = p.classify(&frustum(), None);
        assert!(!v.visible);
        assert!(v.force_visible);
    }

    #[test]
    fn test_classify_far_outside() {
        let mut p = patch_at(Vec3::new(0.0, 0.0, 100.0));
        let v = p.classify(&frustum(), None);
        assert!(!v.visible && !v.force_visible);
    }

    #[test]
    fn test_filter_colliders() {
        let p = patch_at(Vec3::ZERO);
        let colliders = vec![
            Sphere::new(Vec3::new(1.0, 0.5, 0.0), 0.5),
            Sphere::new(Vec3::new(50.0, 0.0, 0.0), 1.0),
        ];
        let hits = p.filter_colliders(&colliders, None);
        assert_eq!(hits, vec![colliders[0]]);

        let many = vec![Sphere::new(Vec3::ONE, 0.5); MAX_SPHERE_COLLIDERS + 10];
        assert_eq!(p.filter_colliders(&many, None).len(), MAX_SPHERE_COLLIDERS);
    }
}
