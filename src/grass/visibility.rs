//! Visibility culling kernel and the visible-index list.
//!
//! Each blade runs a short-circuiting chain of tests (orientation, view
//! frustum, distance density, inner spheres, depth buffer). Accepted blade
//! ids are appended to a shared list through an atomic counter, so the
//! order of ids is unspecified but the set and count are deterministic.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Vec2, Vec3, Vec4Swizzles};
use rayon::prelude::*;

use crate::core::camera::FrameView;
use crate::math::{normalize_or, Sphere};

use super::blade::{BladeStore, GpuBlade};
use super::config::CullingConfig;
use super::depth::DepthBuffer;
use super::height::HeightSampler;
use super::params::{PatchTransform, MAX_INNER_SPHERES};

/// Outcome of the culling chain for one blade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CullResult {
    Visible,
    Orientation,
    Frustum,
    Distance,
    InnerSphere,
    DepthBuffer,
}

/// Everything the culling chain reads besides the blade itself.
#[derive(Clone, Copy)]
pub struct VisibilityContext<'a> {
    pub view: &'a FrameView,
    pub culling: &'a CullingConfig,
    pub inner_spheres: &'a [Sphere],
    pub transform: &'a PatchTransform,
    pub height_field: Option<HeightSampler<'a>>,
    pub depth: Option<&'a DepthBuffer>,
}

/// Blade geometry in world space as seen by the camera.
struct BladeView {
    ground: Vec3,
    mid: Vec3,
    tip: Vec3,
    base: Vec3,
    up: Vec3,
    direction: Vec3,
    cam_dir: Vec3,
    distance: f32,
}

impl BladeView {
    fn new(blade: &GpuBlade, ctx: &VisibilityContext) -> Self {
        let frame = blade.frame().transformed(&ctx.transform.normal);
        let model = &ctx.transform.model;
        let mut ground = model.transform_point3(blade.ground());
        let mut v1 = model.transform_point3(blade.v1());
        let mut tip = model.transform_point3(blade.v2());

        if let Some(sampler) = &ctx.height_field {
            let offset = frame.up * sampler.height_at(ground);
            ground += offset;
            v1 += offset;
            tip += offset;
        }

        let cam_dir = ground - ctx.view.camera_position;
        Self {
            ground,
            mid: ground * 0.25 + v1 * 0.5 + tip * 0.25,
            tip,
            base: ground * 0.81 + v1 * 0.18 + tip * 0.01,
            up: frame.up,
            direction: frame.direction,
            cam_dir,
            distance: cam_dir.length(),
        }
    }
}

/// Run the culling chain for blade `id`.
pub fn classify_blade(id: u32, blade: &GpuBlade, ctx: &VisibilityContext) -> CullResult {
    let cfg = ctx.culling;
    let view = ctx.view;
    let b = BladeView::new(blade, ctx);

    if cfg.orientation_culling {
        let facing = normalize_or(b.cam_dir, Vec3::ZERO).dot(b.direction).abs();
        if facing >= cfg.orientation_threshold {
            return CullResult::Orientation;
        }
    }

    if cfg.frustum_culling
        && ![b.ground, b.mid, b.tip]
            .iter()
            .any(|&p| in_clip_volume(view, p, cfg.frustum_tolerance))
    {
        return CullResult::Frustum;
    }

    if cfg.distance_culling {
        let level = cfg.cull_level.max(1);
        let horizontal = (b.cam_dir - b.up * b.cam_dir.dot(b.up)).length();
        let keep = ((1.0 - horizontal / cfg.max_distance).max(0.0) * level as f32).ceil() as u32;
        if id % level >= keep {
            return CullResult::Distance;
        }
    }

    if cfg.inner_sphere_culling && occluded_by_inner_sphere(view.camera_position, &b, ctx.inner_spheres) {
        return CullResult::InnerSphere;
    }

    if cfg.depth_buffer_culling {
        if let Some(depth) = ctx.depth {
            if occluded_by_depth(view, depth, &b, cfg.depth_tolerance) {
                return CullResult::DepthBuffer;
            }
        }
    }

    CullResult::Visible
}

/// `-w < x, y, z < w` after adding `tolerance` to `w`.
fn in_clip_volume(view: &FrameView, p: Vec3, tolerance: f32) -> bool {
    let clip = view.view_proj * p.extend(1.0);
    let w = clip.w + tolerance;
    clip.x > -w && clip.x < w && clip.y > -w && clip.y < w && clip.z > -w && clip.z < w
}

/// True if some sphere lies between the camera and all three blade points
/// and all three sight lines pass within its radius.
fn occluded_by_inner_sphere(camera: Vec3, b: &BladeView, spheres: &[Sphere]) -> bool {
    let rays = [
        (normalize_or(b.cam_dir, Vec3::ZERO), b.distance),
        ray(camera, b.mid),
        ray(camera, b.tip),
    ];

    spheres.iter().take(MAX_INNER_SPHERES).any(|sphere| {
        let cam_to_center = sphere.center - camera;
        let in_front = rays.iter().all(|&(dir, dist)| {
            let t = dir.dot(cam_to_center);
            (0.0..=dist).contains(&t)
        });
        in_front
            && rays
                .iter()
                .all(|&(dir, _)| dir.cross(cam_to_center).length() <= sphere.radius)
    })
}

fn ray(from: Vec3, to: Vec3) -> (Vec3, f32) {
    let d = to - from;
    (normalize_or(d, Vec3::ZERO), d.length())
}

/// True if the depth buffer is nearer than all three blade points.
fn occluded_by_depth(view: &FrameView, depth: &DepthBuffer, b: &BladeView, tolerance: f32) -> bool {
    let range = view.far - view.near;
    if !(range > 0.0) {
        return false;
    }
    let camera = view.camera_position;
    let points = [
        (b.base, b.distance, 1),
        (b.mid, b.mid.distance(camera), 2),
        (b.tip, b.tip.distance(camera), 3),
    ];

    points.iter().all(|&(p, distance, sample)| {
        let clip = view.view_proj * p.extend(1.0);
        if clip.w <= 0.0 {
            // Behind the camera: the buffer says nothing about it
            return false;
        }
        let uv = clip.xy() / clip.w * 0.5 + 0.5;
        if uv.cmplt(Vec2::ZERO).any() || uv.cmpgt(Vec2::ONE).any() {
            // Off screen: no stored depth covers it
            return false;
        }
        let pixel = uv * view.viewport.as_vec2();
        let stored = depth.fetch(pixel.x as i32, pixel.y as i32, sample);
        let linear = (distance - view.near) / range;
        stored + tolerance < linear
    })
}

/// Append-only list of visible blade ids with its atomic counter.
#[derive(Debug, Default)]
pub struct VisibleIndexList {
    slots: Vec<AtomicU32>,
    count: AtomicU32,
}

impl VisibleIndexList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            count: AtomicU32::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Clear the counter. Must complete before the next dispatch starts.
    pub fn reset(&mut self) {
        *self.count.get_mut() = 0;
    }

    /// Grow to hold at least `capacity` ids.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots.resize_with(capacity, || AtomicU32::new(0));
        }
    }

    /// Claim the next slot and write `id` into it. Returns the slot, or
    /// `None` if the list is full.
    pub fn push(&self, id: u32) -> Option<u32> {
        let slot = self.count.fetch_add(1, Ordering::Relaxed);
        let cell = self.slots.get(slot as usize)?;
        cell.store(id, Ordering::Relaxed);
        Some(slot)
    }

    /// Final counter value, clamped to the capacity.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire).min(self.slots.len() as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Snapshot of the accepted ids, in append order.
    pub fn to_vec(&self) -> Vec<u32> {
        self.slots[..self.count() as usize]
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .collect()
    }
}

/// Cull every blade of a patch into `list`. Returns the visible count.
///
/// The reset happens before any worker starts, and the parallel iterator
/// joins before this returns, so the count is final for the finalizer.
pub fn dispatch(store: &BladeStore, list: &mut VisibleIndexList, ctx: &VisibilityContext) -> u32 {
    list.reserve(store.len());
    list.reset();

    let list = &*list;
    store
        .blades()
        .par_iter()
        .enumerate()
        .for_each(|(id, blade)| {
            if classify_blade(id as u32, blade, ctx) == CullResult::Visible {
                list.push(id as u32);
            }
        });

    list.count()
}
