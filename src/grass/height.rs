//! Terrain height lookup used to lift blades onto a height map.

use glam::{Vec2, Vec3};

use crate::core::{Error, Result};

/// Samples terrain height at normalized `uv` in `[0, 1]²`.
pub trait HeightField: Sync {
    /// Height in world units (already multiplied by the scale).
    fn sample(&self, uv: Vec2) -> f32;

    /// Largest height the field can return; used to inflate patch bounds.
    fn height_scale(&self) -> f32;
}

/// World-space XZ rectangle the height field covers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightMapBounds {
    pub min: Vec2,
    pub extent: Vec2,
}

impl HeightMapBounds {
    pub fn new(min: Vec2, extent: Vec2) -> Self {
        Self { min, extent }
    }

    /// Normalized coordinate of a world position, clamped to the map.
    pub fn uv(&self, position: Vec3) -> Vec2 {
        let rel = Vec2::new(position.x, position.z) - self.min;
        let extent = self.extent.max(Vec2::splat(f32::EPSILON));
        (rel / extent).clamp(Vec2::ZERO, Vec2::ONE)
    }
}

/// A bound height field together with its placement.
#[derive(Clone, Copy)]
pub struct HeightSampler<'a> {
    pub field: &'a dyn HeightField,
    pub bounds: HeightMapBounds,
}

impl<'a> HeightSampler<'a> {
    pub fn new(field: &'a dyn HeightField, bounds: HeightMapBounds) -> Self {
        Self { field, bounds }
    }

    /// Height under a world-space position.
    pub fn height_at(&self, position: Vec3) -> f32 {
        self.field.sample(self.bounds.uv(position))
    }
}

/// CPU height grid with clamp-to-edge bilinear filtering.
#[derive(Clone, Debug)]
pub struct HeightMap {
    width: u32,
    height: u32,
    values: Vec<f32>,
    scale: f32,
}

impl HeightMap {
    /// `values` is row-major, `width * height` normalized heights.
    pub fn new(width: u32, height: u32, values: Vec<f32>, scale: f32) -> Result<Self> {
        if width == 0 || height == 0 || values.len() != (width * height) as usize {
            return Err(Error::Capacity(format!(
                "height map {}x{} needs {} values, got {}",
                width, height, width * height, values.len()
            )));
        }
        Ok(Self { width, height, values, scale })
    }

    /// Uniform height everywhere.
    pub fn flat(value: f32, scale: f32) -> Self {
        Self { width: 1, height: 1, values: vec![value], scale }
    }

    fn texel(&self, x: u32, y: u32) -> f32 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.values[(y * self.width + x) as usize]
    }
}

impl HeightField for HeightMap {
    fn sample(&self, uv: Vec2) -> f32 {
        let uv = uv.clamp(Vec2::ZERO, Vec2::ONE);
        // Texel centers at (i + 0.5) / size
        let fx = (uv.x * self.width as f32 - 0.5).max(0.0);
        let fy = (uv.y * self.height as f32 - 0.5).max(0.0);
        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;

        let top = self.texel(x0, y0) * (1.0 - tx) + self.texel(x0 + 1, y0) * tx;
        let bottom = self.texel(x0, y0 + 1) * (1.0 - tx) + self.texel(x0 + 1, y0 + 1) * tx;
        (top * (1.0 - ty) + bottom * ty) * self.scale
    }

    fn height_scale(&self) -> f32 {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_map() {
        let map = HeightMap::flat(0.5, 4.0);
        assert_eq!(map.sample(Vec2::new(0.3, 0.9)), 2.0);
        assert_eq!(map.height_scale(), 4.0);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let map = HeightMap::new(2, 1, vec![0.0, 1.0], 1.0).unwrap();
        assert!((map.sample(Vec2::new(0.5, 0.5)) - 0.5).abs() < 1e-6);
        // Clamp to edge beyond the outer texel centers
        assert_eq!(map.sample(Vec2::new(0.0, 0.0)), 0.0);
        assert_eq!(map.sample(Vec2::new(1.0, 1.0)), 1.0);
    }

    #[test]
    fn test_size_mismatch() {
        assert!(HeightMap::new(2, 2, vec![0.0; 3], 1.0).is_err());
        assert!(HeightMap::new(0, 2, vec![], 1.0).is_err());
    }

    #[test]
    fn test_bounds_uv_clamps() {
        let bounds = HeightMapBounds::new(Vec2::new(-10.0, -10.0), Vec2::new(20.0, 20.0));
        assert_eq!(bounds.uv(Vec3::ZERO), Vec2::splat(0.5));
        assert_eq!(bounds.uv(Vec3::new(100.0, 5.0, -100.0)), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_sampler_height_at() {
        let map = HeightMap::new(2, 1, vec![0.0, 1.0], 2.0).unwrap();
        let sampler = HeightSampler::new(&map, HeightMapBounds::new(Vec2::ZERO, Vec2::new(2.0, 2.0)));
        assert_eq!(sampler.height_at(Vec3::new(2.0, 0.0, 1.0)), 2.0);
    }
}
