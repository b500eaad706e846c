//! Multisampled linear depth buffer read by the visibility kernel.

use glam::UVec2;

use crate::core::{Error, Result};

/// Linear depth in `[0, 1]` (0 = near plane, 1 = far plane), `samples`
/// values per pixel. Row 0 is the bottom of the screen, matching the
/// `ndc * 0.5 + 0.5` screen mapping.
#[derive(Clone, Debug)]
pub struct DepthBuffer {
    width: u32,
    height: u32,
    samples: u32,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: u32, height: u32, samples: u32, data: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * samples as usize;
        if expected == 0 || data.len() != expected {
            return Err(Error::Capacity(format!(
                "depth buffer {}x{}x{} needs {} values, got {}",
                width, height, samples, expected, data.len()
            )));
        }
        Ok(Self { width, height, samples, data })
    }

    /// Buffer cleared to `depth` (1.0 = nothing drawn).
    pub fn filled(width: u32, height: u32, samples: u32, depth: f32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let samples = samples.max(1);
        let n = width as usize * height as usize * samples as usize;
        Self { width, height, samples, data: vec![depth; n] }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Texel fetch; coordinates and sample index are clamped.
    pub fn fetch(&self, x: i32, y: i32, sample: u32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as usize;
        let y = y.clamp(0, self.height as i32 - 1) as usize;
        let s = sample.min(self.samples - 1) as usize;
        let idx = (y * self.width as usize + x) * self.samples as usize + s;
        self.data[idx]
    }

    /// Write one sample (for building test scenes and CPU pre-passes).
    pub fn store(&mut self, x: u32, y: u32, sample: u32, depth: f32) {
        if x < self.width && y < self.height && sample < self.samples {
            let idx = ((y * self.width + x) * self.samples + sample) as usize;
            self.data[idx] = depth;
        }
    }
}
