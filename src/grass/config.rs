//! Grass simulation configuration (user-facing settings).
//!
//! Loaded from / saved to JSON. Every field has a default so partial files
//! are accepted.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Full grass configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrassConfig {
    /// Visibility test toggles and parameters.
    pub culling: CullingConfig,
    /// Resolve sphere colliders in the force stage.
    pub collision_detection: bool,
    /// Directional and point gravity.
    pub gravity: GravityConfig,
    /// Largest patch the pressure map reserves a block for.
    pub max_blades_per_patch: u32,
    /// Fields of the indirect draw record not driven by culling.
    pub draw: DrawConfig,
}

impl Default for GrassConfig {
    fn default() -> Self {
        Self {
            culling: CullingConfig::default(),
            collision_detection: true,
            gravity: GravityConfig::default(),
            max_blades_per_patch: 10_240,
            draw: DrawConfig::default(),
        }
    }
}

impl GrassConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::info!("Loaded grass config from {}", path.display());
        Ok(config)
    }

    /// Save to a JSON file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.culling.validate()?;
        if self.max_blades_per_patch == 0 {
            return Err(Error::Config("max_blades_per_patch must be > 0".into()));
        }
        let dir = self.gravity.direction;
        if !dir.iter().all(|c| c.is_finite()) {
            return Err(Error::Config("gravity direction must be finite".into()));
        }
        if !(0.0..=1.0).contains(&self.gravity.point_blend) {
            return Err(Error::Config(format!(
                "gravity point_blend {} outside 0..1",
                self.gravity.point_blend
            )));
        }
        Ok(())
    }

    /// Side length of the per-patch pressure block.
    pub fn pressure_block_size(&self) -> u32 {
        (self.max_blades_per_patch as f64).sqrt().ceil() as u32
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Per-test culling switches. Tests run in field order and short-circuit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CullingConfig {
    pub orientation_culling: bool,
    pub frustum_culling: bool,
    pub distance_culling: bool,
    pub inner_sphere_culling: bool,
    pub depth_buffer_culling: bool,
    /// Reject when `|dot(view, blade normal)|` reaches this.
    pub orientation_threshold: f32,
    /// Added to clip-space `w` before the frustum test.
    pub frustum_tolerance: f32,
    /// Horizontal distance at which every blade is dropped.
    pub max_distance: f32,
    /// Number of density buckets for the distance test.
    pub cull_level: u32,
    /// Linear-depth slack for the depth buffer test.
    pub depth_tolerance: f32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            orientation_culling: true,
            frustum_culling: true,
            distance_culling: true,
            inner_sphere_culling: true,
            depth_buffer_culling: true,
            orientation_threshold: 0.9,
            frustum_tolerance: 0.5,
            max_distance: 100.0,
            cull_level: 100,
            depth_tolerance: 0.01,
        }
    }
}

impl CullingConfig {
    /// Every test off; all in-range blades are accepted.
    pub fn disabled() -> Self {
        Self {
            orientation_culling: false,
            frustum_culling: false,
            distance_culling: false,
            inner_sphere_culling: false,
            depth_buffer_culling: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cull_level == 0 {
            return Err(Error::Config("cull_level must be > 0".into()));
        }
        if !(self.max_distance > 0.0) {
            return Err(Error::Config(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        if !(self.orientation_threshold > 0.0 && self.orientation_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "orientation_threshold {} outside (0, 1]",
                self.orientation_threshold
            )));
        }
        Ok(())
    }
}

/// Gravity: a blend of a directional pull and a pull toward a point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityConfig {
    pub direction: [f32; 3],
    pub strength: f32,
    pub point: [f32; 3],
    pub point_strength: f32,
    /// 0 = directional only, 1 = point only.
    pub point_blend: f32,
}

impl Default for GravityConfig {
    fn default() -> Self {
        Self {
            direction: [0.0, -1.0, 0.0],
            strength: 1.0,
            point: [0.0, 0.0, 0.0],
            point_strength: 1.0,
            point_blend: 0.0,
        }
    }
}

/// Static fields of the indirect draw record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            base_instance: 0,
        }
    }
}
