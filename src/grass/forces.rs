//! Force and shape update kernel.
//!
//! Every blade is advanced independently: gravity, wind and a stiffness
//! spring move the tip, the tip is kept above ground, control point 1 is
//! re-derived from the tip and the curve is rescaled back to the blade's
//! height. Sphere colliders then push the tip out and leave a collision
//! force in the blade's pressure cell that slowly decays.

use glam::{Vec3, Vec4};
use rayon::prelude::*;

use crate::core::Result;
use crate::math::{normalize_or, Sphere, LENGTH_EPSILON};

use super::blade::{BladeStore, GpuBlade};
use super::config::GravityConfig;
use super::height::HeightSampler;
use super::params::{GpuForceParams, PatchTransform, MAX_TIME_STEP};
use super::pressure::PressureBlock;
use super::wind::WindModel;

/// Blend of a directional pull and a pull towards a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gravity {
    pub direction: Vec3,
    pub strength: f32,
    pub point: Vec3,
    pub point_strength: f32,
    /// 0 = directional only, 1 = point only
    pub point_blend: f32,
}

impl Gravity {
    /// No gravity at all.
    pub const NONE: Self = Self {
        direction: Vec3::NEG_Y,
        strength: 0.0,
        point: Vec3::ZERO,
        point_strength: 0.0,
        point_blend: 0.0,
    };

    /// Gravity displacement before scaling by height, bending and time.
    ///
    /// Besides the environmental pull, a "front" component proportional to
    /// the blade height bends the blade along its front axis, flipped when
    /// the pull points backwards.
    pub fn displacement(&self, tip: Vec3, front: Vec3, height: f32) -> Vec3 {
        let dir_weight = self.strength * (1.0 - self.point_blend);
        let point_weight = self.point_strength * self.point_blend;

        let mut g = normalize_or(self.direction, Vec3::ZERO) * dir_weight
            + normalize_or(self.point - tip, Vec3::ZERO) * point_weight;

        let sign = if normalize_or(g, Vec3::ZERO).dot(front) >= -0.01 { 1.0 } else { -1.0 };
        g += front * sign * height * (dir_weight + point_weight) * 0.25;
        g
    }
}

impl Default for Gravity {
    fn default() -> Self {
        Self::from(&GravityConfig::default())
    }
}

impl From<&GravityConfig> for Gravity {
    fn from(cfg: &GravityConfig) -> Self {
        Self {
            direction: Vec3::from_array(cfg.direction),
            strength: cfg.strength,
            point: Vec3::from_array(cfg.point),
            point_strength: cfg.point_strength,
            point_blend: cfg.point_blend.clamp(0.0, 1.0),
        }
    }
}

/// Per-frame inputs of the force stage.
#[derive(Clone, Copy, Debug)]
pub struct ForceParams<'a> {
    pub dt: f32,
    pub wind: WindModel,
    pub gravity: Gravity,
    pub colliders: &'a [Sphere],
    pub collision_detection: bool,
}

impl Default for ForceParams<'_> {
    fn default() -> Self {
        Self {
            dt: 0.0,
            wind: WindModel::None,
            gravity: Gravity::default(),
            colliders: &[],
            collision_detection: true,
        }
    }
}

impl ForceParams<'_> {
    /// Pack into the GPU uniform layout.
    pub fn to_gpu(&self) -> GpuForceParams {
        let (wind, wind_type) = GpuForceParams::wind_fields(&self.wind);
        let collider_count = if self.collision_detection { self.colliders.len() as u32 } else { 0 };
        GpuForceParams {
            wind,
            gravity: self.gravity.direction.extend(self.gravity.strength).to_array(),
            gravity_point: self.gravity.point.extend(self.gravity.point_strength).to_array(),
            gravity_blend: self.gravity.point_blend,
            dt: self.dt,
            wind_type,
            collider_count,
        }
    }
}

/// Arc-length estimate of the quadratic curve (ground, v1, v2):
/// the average of twice the chord and the control polygon length.
pub fn curve_length(ground: Vec3, v1: Vec3, v2: Vec3) -> f32 {
    let chord = ground.distance(v2);
    let polygon = ground.distance(v1) + v1.distance(v2);
    (2.0 * chord + polygon) / 3.0
}

/// Control point 1 for a given tip, in the plane spanned by up and the tip.
pub fn control_point_1(ground: Vec3, v2: Vec3, up: Vec3, height: f32) -> Vec3 {
    let gv2 = v2 - ground;
    let lateral = gv2 - up * gv2.dot(up);
    let ratio = lateral.length() / height;
    let factor = (1.0 - ratio).max(0.05 * ratio.max(1.0));
    ground + up * height * factor
}

/// Rescale both curve segments so the curve length equals `height`.
pub fn persist_length(ground: Vec3, v1: Vec3, v2: Vec3, height: f32) -> (Vec3, Vec3) {
    let length = curve_length(ground, v1, v2);
    if length <= LENGTH_EPSILON {
        return (v1, v2);
    }
    let r = height / length;
    let new_v1 = ground + (v1 - ground) * r;
    let new_v2 = new_v1 + (v2 - v1) * r;
    (new_v1, new_v2)
}

/// Ground clamp, control point 1 and length correction.
fn correct_shape(ground: Vec3, v2: Vec3, up: Vec3, height: f32) -> (Vec3, Vec3) {
    let below = (v2 - ground).dot(up).min(0.0);
    let v2 = v2 - up * below;
    let v1 = control_point_1(ground, v2, up, height);
    persist_length(ground, v1, v2, height)
}

/// Push the tip out of every nearby collider.
///
/// Returns the corrected tip, the collision force added and whether any
/// push happened.
pub fn resolve_collisions(
    ground: Vec3,
    v1: Vec3,
    mut v2: Vec3,
    front: Vec3,
    height: f32,
    colliders: &[Sphere],
) -> (Vec3, f32, bool) {
    let mut added_force = 0.0;
    let mut dirty = false;

    for sphere in colliders {
        let c = sphere.center;
        let r = sphere.radius;
        if ground.distance(c) - r >= height {
            continue;
        }

        // Tip inside the sphere: project it onto the surface
        let to_center = c - v2;
        let dist = to_center.length();
        let penetration = dist - r;
        if penetration < 0.0 {
            let axis = if dist > LENGTH_EPSILON { to_center / dist } else { -front };
            let push = axis * penetration;
            added_force += push.length_squared();
            v2 += push;
            dirty = true;
        }

        // Curve middle inside the sphere: push the tip harder
        let half = ground * 0.25 + v1 * 0.5 + v2 * 0.25;
        let to_center = c - half;
        let dist = to_center.length();
        let penetration = dist - r;
        if penetration < 0.0 {
            let axis = if dist > LENGTH_EPSILON { to_center / dist } else { -front };
            let push = axis * penetration * 4.0;
            added_force += push.length_squared();
            v2 += push;
            dirty = true;
        }
    }

    (v2, added_force, dirty)
}

/// Advance a single blade and its pressure cell by one step.
///
/// Returns a debug record: the total displacement applied this frame
/// (`xyz`) and the new collision force (`w`).
pub fn update_blade(
    blade: &mut GpuBlade,
    cell: &mut Vec4,
    params: &ForceParams,
    transform: &PatchTransform,
    height_field: Option<&HeightSampler>,
) -> [f32; 4] {
    let height = blade.height;
    if !(height > LENGTH_EPSILON) {
        return [0.0; 4];
    }

    let frame = blade.frame().transformed(&transform.normal);
    let up = frame.up;
    let mut ground = transform.model.transform_point3(blade.ground());
    let map_height = height_field.map_or(0.0, |h| h.height_at(ground));
    ground += up * map_height;

    let idle_tip = ground + up * height;
    let mdt = params.dt.clamp(0.0, MAX_TIME_STEP);
    let bending = blade.bending;

    let mut collision_force = (cell.w - (1.0 - bending) * 0.5 * mdt).max(0.0);
    let start = idle_tip + cell.truncate();
    let gv2 = start - ground;

    let gravity = params.gravity.displacement(start, frame.front, height) * height * bending * mdt;
    let wind = params.wind.displacement(ground, gv2, up, height) * bending * mdt;
    let stiffness =
        (idle_tip - start) * (1.0 - bending * 0.25) * (1.0 - collision_force).max(0.1) * mdt;

    let (mut v1, mut v2) = correct_shape(ground, start + gravity + wind + stiffness, up, height);

    if params.collision_detection && !params.colliders.is_empty() {
        let (pushed, force, dirty) =
            resolve_collisions(ground, v1, v2, frame.front, height, params.colliders);
        collision_force += force;
        if dirty {
            (v1, v2) = correct_shape(ground, pushed, up, height);
        }
    }

    *cell = (v2 - idle_tip).extend(collision_force);

    let offset = up * map_height;
    blade.set_control_points(
        transform.inverse.transform_point3(v1 - offset),
        transform.inverse.transform_point3(v2 - offset),
    );

    (v2 - start).extend(collision_force).to_array()
}

/// Run the force stage over a whole patch.
///
/// Blade `i` owns cell `i` of the patch's pressure block; the zip over
/// disjoint slices gives every worker exclusive access to its blade and cell.
pub fn dispatch(
    store: &mut BladeStore,
    pressure: &mut PressureBlock,
    params: &ForceParams,
    transform: &PatchTransform,
    height_field: Option<&HeightSampler>,
) -> Result<()> {
    let cells = pressure.cells_mut(store.len())?;
    let (blades, debug) = store.parts_mut();

    blades
        .par_iter_mut()
        .zip(cells.par_iter_mut())
        .zip(debug.par_iter_mut())
        .for_each(|((blade, cell), scratch)| {
            *scratch = update_blade(blade, cell, params, transform, height_field);
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grass::height::{HeightMap, HeightMapBounds};
    use glam::{Mat4, Quat, UVec2, Vec2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn blade(height: f32, bending: f32) -> GpuBlade {
        GpuBlade::straight(Vec3::ZERO, Vec3::Y, 0.7, height, 0.05, bending)
    }

    fn step(b: &mut GpuBlade, cell: &mut Vec4, params: &ForceParams) {
        update_blade(b, cell, params, &PatchTransform::default(), None);
    }

    fn assert_invariants(b: &GpuBlade) {
        let len = curve_length(b.ground(), b.v1(), b.v2());
        assert!(
            (len - b.height).abs() <= 1e-4 * b.height,
            "curve length {len} != height {}",
            b.height
        );
        assert!((b.v2() - b.ground()).dot(b.up()) >= -1e-5, "tip below ground: {:?}", b.v2());
    }

    #[test]
    fn test_zero_force_keeps_idle_pose() {
        let mut b = blade(0.8, 0.0);
        let mut cell = Vec4::ZERO;
        let params = ForceParams {
            dt: 0.016,
            gravity: Gravity::NONE,
            ..Default::default()
        };
        step(&mut b, &mut cell, &params);

        let idle = Vec3::new(0.0, 0.8, 0.0);
        assert!(b.v2().abs_diff_eq(idle, 1e-5), "v2 = {:?}", b.v2());
        assert!(b.v1().abs_diff_eq(idle, 1e-5), "v1 = {:?}", b.v1());
        assert!(cell.truncate().length() < 1e-5);
    }

    #[test]
    fn test_zero_force_converges_from_bent_pose() {
        let mut b = blade(1.0, 0.0);
        // Stale displacement, a full step brings the tip back home
        let mut cell = Vec4::new(0.3, -0.2, 0.0, 0.0);
        let params = ForceParams { dt: 1.0, gravity: Gravity::NONE, ..Default::default() };
        step(&mut b, &mut cell, &params);
        assert!(b.v2().abs_diff_eq(Vec3::Y, 1e-4), "v2 = {:?}", b.v2());
        assert_invariants(&b);
    }

    #[test]
    fn test_gravity_bends_blade() {
        let mut b = blade(0.8, 0.5);
        let mut cell = Vec4::ZERO;
        let params = ForceParams { dt: 0.1, ..Default::default() };
        for _ in 0..20 {
            step(&mut b, &mut cell, &params);
            assert_invariants(&b);
        }
        assert!(b.v2().y < 0.8 - 1e-3, "gravity should lower the tip: {:?}", b.v2());
        let front = b.frame().front;
        assert!((b.v2() - Vec3::new(0.0, b.v2().y, 0.0)).dot(front) > 0.0);
    }

    #[test]
    fn test_rigid_blade_ignores_gravity_and_wind() {
        let mut b = blade(0.6, 0.0);
        let mut cell = Vec4::ZERO;
        let params = ForceParams {
            dt: 0.05,
            wind: WindModel::Directional { velocity: Vec3::new(6.0, 0.0, 0.0), phase: 0.0 },
            ..Default::default()
        };
        step(&mut b, &mut cell, &params);
        assert!(b.v2().abs_diff_eq(Vec3::new(0.0, 0.6, 0.0), 1e-5));
    }

    #[test]
    fn test_invariants_under_random_forces() {
        let mut rng = StdRng::seed_from_u64(42);
        let colliders = [
            Sphere::new(Vec3::new(0.2, 0.5, 0.1), 0.3),
            Sphere::new(Vec3::new(-0.4, 0.1, 0.0), 0.25),
        ];
        for _ in 0..50 {
            let mut b = GpuBlade::straight(
                Vec3::new(rng.random_range(-0.5..0.5), 0.0, rng.random_range(-0.5..0.5)),
                Vec3::new(rng.random_range(-0.2..0.2), 1.0, rng.random_range(-0.2..0.2)),
                rng.random_range(0.0..std::f32::consts::TAU),
                rng.random_range(0.3..1.2),
                0.05,
                rng.random::<f32>(),
            );
            let mut cell = Vec4::ZERO;
            let params = ForceParams {
                dt: rng.random_range(0.0..0.5),
                wind: WindModel::Directional {
                    velocity: Vec3::new(rng.random_range(-8.0..8.0), 0.0, rng.random_range(-8.0..8.0)),
                    phase: rng.random_range(0.0..10.0),
                },
                gravity: Gravity::default(),
                colliders: &colliders,
                collision_detection: true,
            };
            for _ in 0..5 {
                step(&mut b, &mut cell, &params);
                assert_invariants(&b);
                assert!(cell.is_finite());
            }
        }
    }

    #[test]
    fn test_collider_at_idle_tip() {
        for bending in [0.0, 0.3, 1.0] {
            let height = 0.8;
            let mut b = blade(height, bending);
            let mut cell = Vec4::ZERO;
            let center = Vec3::new(0.0, height, 0.0);
            let colliders = [Sphere::new(center, height * 0.5)];
            let params = ForceParams { dt: 0.016, colliders: &colliders, ..Default::default() };
            step(&mut b, &mut cell, &params);

            assert!(
                b.v2().distance(center) >= height * 0.5 - 1e-4,
                "tip still inside collider for bending {bending}: {:?}",
                b.v2()
            );
            assert!(cell.w > 0.0);
            assert_invariants(&b);
        }
    }

    #[test]
    fn test_collisions_disabled() {
        let mut b = blade(0.8, 0.0);
        let mut cell = Vec4::ZERO;
        let colliders = [Sphere::new(Vec3::new(0.0, 0.8, 0.0), 0.4)];
        let params = ForceParams {
            dt: 0.016,
            colliders: &colliders,
            collision_detection: false,
            ..Default::default()
        };
        step(&mut b, &mut cell, &params);
        assert!(b.v2().abs_diff_eq(Vec3::new(0.0, 0.8, 0.0), 1e-5));
        assert_eq!(cell.w, 0.0);
    }

    #[test]
    fn test_far_collider_is_skipped() {
        let (v2, force, dirty) = resolve_collisions(
            Vec3::ZERO,
            Vec3::Y,
            Vec3::Y,
            Vec3::X,
            1.0,
            &[Sphere::new(Vec3::new(5.0, 0.0, 0.0), 1.0)],
        );
        assert_eq!(v2, Vec3::Y);
        assert_eq!(force, 0.0);
        assert!(!dirty);
    }

    #[test]
    fn test_degenerate_push_uses_front() {
        let (v2, force, dirty) = resolve_collisions(
            Vec3::ZERO,
            Vec3::Y,
            Vec3::Y,
            Vec3::Z,
            1.0,
            &[Sphere::new(Vec3::Y, 0.1)],
        );
        assert!(dirty);
        assert!(force > 0.0);
        assert!(v2.z > 0.0);
    }

    #[test]
    fn test_collision_force_decays() {
        let mut b = blade(0.8, 0.4);
        let mut cell = Vec4::new(0.0, 0.0, 0.0, 0.5);
        let params = ForceParams { dt: 0.1, gravity: Gravity::NONE, ..Default::default() };
        let mut last = cell.w;
        for _ in 0..30 {
            step(&mut b, &mut cell, &params);
            assert!(cell.w <= last);
            last = cell.w;
        }
        assert_eq!(cell.w, 0.0);
    }

    #[test]
    fn test_ground_clamp() {
        let mut b = blade(1.0, 1.0);
        // Stored displacement pulls the tip well below ground
        let mut cell = Vec4::new(0.0, -3.0, 0.0, 0.0);
        let params = ForceParams { dt: 0.0, gravity: Gravity::NONE, ..Default::default() };
        step(&mut b, &mut cell, &params);
        assert_invariants(&b);
        assert!(b.v2().y.abs() < 1e-5);
    }

    #[test]
    fn test_transformed_patch_round_trips_to_model_space() {
        let model = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.8),
            Vec3::new(10.0, 2.0, -4.0),
        );
        let transform = PatchTransform::new(model);
        let mut b = blade(0.7, 0.5);
        let mut cell = Vec4::ZERO;
        let params = ForceParams { dt: 0.05, ..Default::default() };
        for _ in 0..10 {
            update_blade(&mut b, &mut cell, &params, &transform, None);
            assert_invariants(&b);
        }
        assert_eq!(b.ground(), Vec3::ZERO);
    }

    #[test]
    fn test_height_field_offset_is_removed_on_write_back() {
        let map = HeightMap::flat(1.0, 3.0);
        let sampler = HeightSampler::new(&map, HeightMapBounds::new(Vec2::splat(-5.0), Vec2::splat(10.0)));
        let mut b = blade(0.5, 0.0);
        let mut cell = Vec4::ZERO;
        let params = ForceParams { dt: 0.016, gravity: Gravity::NONE, ..Default::default() };
        update_blade(&mut b, &mut cell, &params, &PatchTransform::default(), Some(&sampler));
        assert!(b.v2().abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-5));
    }

    #[test]
    fn test_dispatch_writes_each_cell() {
        let blades = (0..64)
            .map(|i| GpuBlade::straight(Vec3::new(i as f32, 0.0, 0.0), Vec3::Y, i as f32, 0.8, 0.05, 0.5))
            .collect();
        let mut store = BladeStore::new(blades);
        let mut block = PressureBlock::new(UVec2::ZERO, 8);
        let params = ForceParams { dt: 0.05, ..Default::default() };

        dispatch(&mut store, &mut block, &params, &PatchTransform::default(), None).unwrap();

        for (i, b) in store.blades().iter().enumerate() {
            let cell = block.cell(i);
            let idle = b.ground() + Vec3::Y * b.height;
            assert!((b.v2() - idle).abs_diff_eq(cell.truncate(), 1e-5));
            assert!(cell.truncate().length() > 0.0);
            assert_invariants(b);
        }
        assert!(store.debug().iter().any(|d| d[0] != 0.0 || d[2] != 0.0));
    }

    #[test]
    fn test_dispatch_capacity_error() {
        let mut store = BladeStore::new(vec![blade(1.0, 0.5); 5]);
        let mut block = PressureBlock::new(UVec2::ZERO, 2);
        let res = dispatch(&mut store, &mut block, &ForceParams::default(), &PatchTransform::default(), None);
        assert!(res.is_err());
    }

    #[test]
    fn test_point_gravity_blend() {
        let point_only = Gravity {
            direction: Vec3::NEG_Y,
            strength: 0.0,
            point: Vec3::new(5.0, 1.0, 0.0),
            point_strength: 1.0,
            point_blend: 1.0,
        };
        let g = point_only.displacement(Vec3::Y, Vec3::Z, 1.0);
        assert!(g.abs_diff_eq(Vec3::new(1.0, 0.0, 0.25), 1e-6), "g = {g:?}");

        let half = Gravity { strength: 1.0, point_blend: 0.5, ..point_only };
        let g = half.displacement(Vec3::Y, Vec3::Z, 1.0);
        assert!(g.abs_diff_eq(Vec3::new(0.5, -0.5, 0.25), 1e-6), "g = {g:?}");
    }

    #[test]
    fn test_forward_lean_follows_pull_direction() {
        let pull = |direction: Vec3| Gravity {
            direction,
            strength: 1.0,
            point: Vec3::ZERO,
            point_strength: 0.0,
            point_blend: 0.0,
        };
        let front = Vec3::Z;

        let backward = pull(Vec3::NEG_Z).displacement(Vec3::Y, front, 1.0);
        assert!(backward.abs_diff_eq(Vec3::new(0.0, 0.0, -1.25), 1e-6), "{backward:?}");
        assert!(backward.dot(front) < 0.0);

        let forward = pull(Vec3::Z).displacement(Vec3::Y, front, 1.0);
        assert!(forward.abs_diff_eq(Vec3::new(0.0, 0.0, 1.25), 1e-6), "{forward:?}");

        // Sideways pull still leans forward
        let sideways = pull(Vec3::X).displacement(Vec3::Y, front, 1.0);
        assert!(sideways.abs_diff_eq(Vec3::new(1.0, 0.0, 0.25), 1e-6), "{sideways:?}");
    }

    #[test]
    fn test_collider_around_curve_middle_only() {
        let ground = Vec3::ZERO;
        let v1 = Vec3::Y;
        let v2 = Vec3::Y;
        // Middle (0, 0.75, 0) is 0.3 from the centre, tip about 0.39
        let sphere = Sphere::new(Vec3::new(0.3, 0.75, 0.0), 0.35);
        assert!(sphere.center.distance(v2) > sphere.radius);

        let (pushed, force, dirty) = resolve_collisions(ground, v1, v2, Vec3::Z, 1.0, &[sphere]);
        assert!(dirty);
        // Penetration 0.05, scaled by four, pushes the tip away along -X
        assert!(pushed.abs_diff_eq(Vec3::new(-0.2, 1.0, 0.0), 1e-5), "pushed = {pushed:?}");
        assert!((force - 0.04).abs() < 1e-5, "force = {force}");
    }

    #[test]
    fn test_persist_length_skips_vanishing_curve() {
        let tiny = Vec3::new(0.0, 1e-8, 0.0);
        let (v1, v2) = persist_length(Vec3::ZERO, tiny, tiny, 1.0);
        assert_eq!(v1, tiny);
        assert_eq!(v2, tiny);
    }

    #[test]
    fn test_to_gpu() {
        let colliders = [Sphere::new(Vec3::ZERO, 1.0); 3];
        let params = ForceParams { dt: 0.02, colliders: &colliders, ..Default::default() };
        let gpu = params.to_gpu();
        assert_eq!(gpu.collider_count, 3);
        assert_eq!(gpu.wind_type, 99);
        assert_eq!(gpu.gravity, [0.0, -1.0, 0.0, 1.0]);
    }
}
