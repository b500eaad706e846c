//! Responsive grass simulation.
//!
//! Blades are bent quadratic curves grouped into patches. Every frame runs
//! three data-parallel stages per patch: the force update (gravity, wind,
//! stiffness, sphere collisions), visibility culling into a compacted
//! index list, and the indirect draw finalizer.

pub mod blade;
pub mod config;
pub mod depth;
pub mod forces;
pub mod generator;
pub mod height;
pub mod indirect;
pub mod params;
pub mod patch;
pub mod pressure;
pub mod visibility;
pub mod wind;

pub use blade::{BladeFrame, BladeStore, GpuBlade};
pub use config::{CullingConfig, DrawConfig, GrassConfig, GravityConfig};
pub use depth::DepthBuffer;
pub use forces::{ForceParams, Gravity};
pub use generator::{split_into_patches, BladeFieldBuilder, BladeShape, GroundTriangle};
pub use height::{HeightField, HeightMap, HeightMapBounds, HeightSampler};
pub use indirect::DrawElementsIndirect;
pub use params::{GpuForceParams, PatchTransform, MAX_INNER_SPHERES, MAX_SPHERE_COLLIDERS};
pub use patch::{GrassPatch, PatchVisibility};
pub use pressure::{PressureBlock, PressureMap};
pub use visibility::{CullResult, VisibilityContext, VisibleIndexList};
pub use wind::{WindGenerator, WindKind, WindModel};

use crate::core::camera::FrameView;
use crate::core::time::{timed, StageSample, StageTimings};
use crate::core::{Error, Result};
use crate::math::{Frustum, Sphere};

/// Transient per-frame inputs owned by the host.
#[derive(Clone, Copy, Default)]
pub struct FrameInputs<'a> {
    pub colliders: &'a [Sphere],
    pub inner_spheres: &'a [Sphere],
    pub height_field: Option<HeightSampler<'a>>,
    pub depth: Option<&'a DepthBuffer>,
}

/// Summary of one `GrassSystem::update`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub patches: usize,
    pub force_patches: usize,
    pub visible_patches: usize,
    pub total_blades: usize,
    pub visible_blades: u32,
    pub timings: StageSample,
}

/// Owns the patches, the pressure map and the wind, and runs the pipeline.
pub struct GrassSystem {
    config: GrassConfig,
    patches: Vec<GrassPatch>,
    pressure: PressureMap,
    wind: WindGenerator,
    timings: StageTimings,
}

impl GrassSystem {
    pub fn new(config: GrassConfig, patches: Vec<GrassPatch>) -> Result<Self> {
        config.validate()?;

        let block_size = config.pressure_block_size();
        let capacity = (block_size * block_size) as usize;
        if let Some(p) = patches.iter().find(|p| p.len() > capacity) {
            return Err(Error::Capacity(format!(
                "patch with {} blades exceeds pressure block capacity {}",
                p.len(),
                capacity
            )));
        }

        let pressure = PressureMap::new(block_size, patches.len());
        log::info!(
            "Grass system: {} patches, {} blades, pressure map {}x{}",
            patches.len(),
            patches.iter().map(GrassPatch::len).sum::<usize>(),
            pressure.dimensions().x,
            pressure.dimensions().y
        );

        Ok(Self {
            config,
            patches,
            pressure,
            wind: WindGenerator::default(),
            timings: StageTimings::default(),
        })
    }

    /// Split a generated field into patches sized for the config.
    pub fn from_field(config: GrassConfig, blades: Vec<GpuBlade>) -> Result<Self> {
        let patches = split_into_patches(blades, config.max_blades_per_patch as usize);
        Self::new(config, patches)
    }

    pub fn config(&self) -> &GrassConfig {
        &self.config
    }

    /// Replace the configuration. Changing `max_blades_per_patch` needs a
    /// rebuild and is rejected here.
    pub fn set_config(&mut self, config: GrassConfig) -> Result<()> {
        config.validate()?;
        if config.pressure_block_size() != self.pressure.block_size() {
            return Err(Error::Config(
                "max_blades_per_patch cannot change on a live system".into(),
            ));
        }
        self.config = config;
        Ok(())
    }

    pub fn patches(&self) -> &[GrassPatch] {
        &self.patches
    }

    pub fn pressure_map(&self) -> &PressureMap {
        &self.pressure
    }

    pub fn wind(&self) -> &WindGenerator {
        &self.wind
    }

    pub fn wind_mut(&mut self) -> &mut WindGenerator {
        &mut self.wind
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn blade_count(&self) -> usize {
        self.patches.iter().map(GrassPatch::len).sum()
    }

    /// Drop all accumulated deformation.
    pub fn reset_pressure(&mut self) {
        self.pressure.clear();
    }

    /// Run one frame: classify, force, visibility, finalize.
    pub fn update(&mut self, dt: f32, view: &FrameView, frame: &FrameInputs) -> Result<FrameStats> {
        self.wind.update(dt);
        let wind = self.wind.model();
        let gravity = Gravity::from(&self.config.gravity);
        let frustum = Frustum::from_view_projection(&view.view_proj);
        let height_scale = frame.height_field.map(|h| h.field.height_scale());

        let mut inner_spheres = frame.inner_spheres;
        if inner_spheres.len() > MAX_INNER_SPHERES {
            log::warn!(
                "{} inner spheres supplied, only the first {} are used",
                inner_spheres.len(),
                MAX_INNER_SPHERES
            );
            inner_spheres = &inner_spheres[..MAX_INNER_SPHERES];
        }

        let mut stats = FrameStats {
            patches: self.patches.len(),
            total_blades: self.blade_count(),
            ..FrameStats::default()
        };
        for patch in &mut self.patches {
            let state = patch.classify(&frustum, height_scale);
            stats.force_patches += usize::from(state.force_visible);
            stats.visible_patches += usize::from(state.visible);
        }

        let config = &self.config;
        let patches = &mut self.patches;
        let pressure = &mut self.pressure;

        let (forces, force_ms) = timed(|| -> Result<()> {
            for (patch, block) in patches.iter_mut().zip(pressure.blocks_mut()) {
                if !patch.visibility().force_visible {
                    continue;
                }
                let colliders = if config.collision_detection && !frame.colliders.is_empty() {
                    patch.filter_colliders(frame.colliders, height_scale)
                } else {
                    Vec::new()
                };
                let params = ForceParams {
                    dt,
                    wind,
                    gravity,
                    colliders: &colliders,
                    collision_detection: config.collision_detection,
                };
                let transform = *patch.transform();
                forces::dispatch(&mut patch.blades, block, &params, &transform, frame.height_field.as_ref())?;
            }
            Ok(())
        });
        forces?;

        let ((), visibility_ms) = timed(|| {
            for patch in patches.iter_mut() {
                if !patch.visibility().visible {
                    patch.clear_outputs();
                    continue;
                }
                let transform = *patch.transform();
                let ctx = VisibilityContext {
                    view,
                    culling: &config.culling,
                    inner_spheres,
                    transform: &transform,
                    height_field: frame.height_field,
                    depth: frame.depth,
                };
                visibility::dispatch(&patch.blades, &mut patch.visible, &ctx);
            }
        });

        let (visible_blades, finalize_ms) = timed(|| {
            patches
                .iter_mut()
                .map(|patch| {
                    indirect::finalize(&patch.visible, &config.draw, &mut patch.draw);
                    patch.draw.count
                })
                .sum::<u32>()
        });

        stats.visible_blades = visible_blades;
        stats.timings = StageSample { force_ms, visibility_ms, finalize_ms };
        self.timings.record(stats.timings);

        log::debug!(
            "Grass frame: {}/{} blades visible, {}/{} patches visible, force {:.2}ms cull {:.2}ms",
            stats.visible_blades,
            stats.total_blades,
            stats.visible_patches,
            stats.patches,
            force_ms,
            visibility_ms
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::Camera;
    use glam::{UVec2, Vec2, Vec3};

    fn view() -> FrameView {
        Camera::look_at(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, Vec3::Y).frame_view(UVec2::new(128, 72))
    }

    fn field() -> Vec<GpuBlade> {
        BladeFieldBuilder::new(11)
            .with_density(20.0)
            .rectangle(Vec2::new(-2.0, -2.0), Vec2::new(2.0, 2.0), 0.0)
    }

    #[test]
    fn test_new_rejects_oversized_patch() {
        let config = GrassConfig { max_blades_per_patch: 16, ..GrassConfig::default() };
        let patch = GrassPatch::new(BladeStore::new(field()), glam::Mat4::IDENTITY);
        assert!(matches!(GrassSystem::new(config, vec![patch]), Err(Error::Capacity(_))));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = GrassConfig::default();
        config.culling.cull_level = 0;
        assert!(matches!(GrassSystem::new(config, Vec::new()), Err(Error::Config(_))));
    }

    #[test]
    fn test_update_without_culling_draws_everything() {
        let config = GrassConfig {
            culling: CullingConfig::disabled(),
            max_blades_per_patch: 64,
            ..GrassConfig::default()
        };
        let mut system = GrassSystem::from_field(config, field()).unwrap();
        assert!(system.patches().len() > 1);
        let total = system.blade_count();

        let stats = system.update(0.016, &view(), &FrameInputs::default()).unwrap();

        assert_eq!(stats.total_blades, total);
        assert_eq!(stats.visible_blades as usize, total);
        assert_eq!(stats.visible_patches, stats.patches);
        for patch in system.patches() {
            let mut ids = patch.visible_list().to_vec();
            ids.sort_unstable();
            assert_eq!(ids, (0..patch.len() as u32).collect::<Vec<_>>());
            assert_eq!(patch.draw_record().count as usize, patch.len());
            assert_eq!(patch.draw_record().instance_count, 1);
        }
        assert_eq!(system.timings().frames_recorded(), 1);
    }

    #[test]
    fn test_update_keeps_blade_invariants() {
        let config = GrassConfig { max_blades_per_patch: 100, ..GrassConfig::default() };
        let mut system = GrassSystem::from_field(config, field()).unwrap();
        let colliders = [Sphere::new(Vec3::new(0.0, 0.3, 0.0), 0.8)];
        let frame = FrameInputs { colliders: &colliders, ..FrameInputs::default() };

        for _ in 0..10 {
            system.update(0.05, &view(), &frame).unwrap();
        }

        for patch in system.patches() {
            for b in patch.blades().blades() {
                let len = forces::curve_length(b.ground(), b.v1(), b.v2());
                assert!((len - b.height).abs() <= 1e-4 * b.height);
                assert!((b.v2() - b.ground()).dot(b.up()) >= -1e-5);
            }
        }
        let touched = system
            .pressure_map()
            .to_image()
            .iter()
            .filter(|c| c[3] > 0.0)
            .count();
        assert!(touched > 0, "collider should leave collision force behind");
    }

    #[test]
    fn test_patches_out_of_view_draw_nothing() {
        let config = GrassConfig { max_blades_per_patch: 64, ..GrassConfig::default() };
        let mut system = GrassSystem::from_field(config, field()).unwrap();
        // Look away from the field
        let away = Camera::look_at(Vec3::new(0.0, 3.0, 8.0), Vec3::new(0.0, 3.0, 20.0), Vec3::Y)
            .frame_view(UVec2::new(128, 72));

        let stats = system.update(0.016, &away, &FrameInputs::default()).unwrap();
        assert_eq!(stats.visible_patches, 0);
        assert_eq!(stats.visible_blades, 0);
        assert!(system.patches().iter().all(|p| p.draw_record().count == 0));
    }

    #[test]
    fn test_too_many_inner_spheres_are_truncated() {
        let config = GrassConfig { max_blades_per_patch: 400, ..GrassConfig::default() };
        let mut system = GrassSystem::from_field(config, field()).unwrap();
        let spheres = vec![Sphere::new(Vec3::new(0.0, 100.0, 0.0), 0.1); MAX_INNER_SPHERES + 5];
        let frame = FrameInputs { inner_spheres: &spheres, ..FrameInputs::default() };
        let stats = system.update(0.016, &view(), &frame).unwrap();
        assert!(stats.visible_blades > 0);
    }

    #[test]
    fn test_set_config() {
        let mut system = GrassSystem::from_field(GrassConfig::default(), field()).unwrap();
        let mut cfg = GrassConfig::default();
        cfg.collision_detection = false;
        assert!(system.set_config(cfg).is_ok());
        assert!(!system.config().collision_detection);

        let cfg = GrassConfig { max_blades_per_patch: 4, ..GrassConfig::default() };
        assert!(system.set_config(cfg).is_err());
    }
}
