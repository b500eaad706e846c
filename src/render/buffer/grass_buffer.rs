//! GPU storage buffers for one patch of grass
//!
//! Holds the blade array, the patch's pressure block, the collider list,
//! the force uniform, the compacted visible-index list and the indirect
//! draw record. Buffers are sized once for `capacity` blades and reused
//! for every patch uploaded through them.

use glam::Vec4;

use crate::core::{Error, Result};
use crate::grass::blade::GpuBlade;
use crate::grass::indirect::DrawElementsIndirect;
use crate::grass::params::{GpuForceParams, MAX_SPHERE_COLLIDERS};
use crate::grass::patch::GrassPatch;
use crate::grass::pressure::PressureBlock;
use crate::math::{GpuSphere, Sphere};

/// Binding slots, matching the compute shaders
pub const BLADES_BINDING: u32 = 0;
pub const PRESSURE_BINDING: u32 = 1;
pub const COLLIDERS_BINDING: u32 = 2;
pub const FORCE_PARAMS_BINDING: u32 = 3;
pub const VISIBLE_BINDING: u32 = 4;
pub const INDIRECT_BINDING: u32 = 5;

/// Byte sizes of every buffer for a given blade capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrassBufferSizes {
    pub blades: u64,
    pub pressure: u64,
    pub colliders: u64,
    pub force_params: u64,
    pub visible: u64,
    pub indirect: u64,
}

impl GrassBufferSizes {
    pub fn for_capacity(capacity: usize, pressure_block_size: u32) -> Self {
        let capacity = capacity.max(1) as u64;
        let cells = (pressure_block_size.max(1) as u64).pow(2);
        Self {
            blades: capacity * std::mem::size_of::<GpuBlade>() as u64,
            pressure: cells * std::mem::size_of::<Vec4>() as u64,
            colliders: MAX_SPHERE_COLLIDERS as u64 * std::mem::size_of::<GpuSphere>() as u64,
            force_params: std::mem::size_of::<GpuForceParams>() as u64,
            visible: capacity * std::mem::size_of::<u32>() as u64,
            indirect: std::mem::size_of::<DrawElementsIndirect>() as u64,
        }
    }

    pub fn total(&self) -> u64 {
        self.blades + self.pressure + self.colliders + self.force_params + self.visible + self.indirect
    }
}

fn check_fits(what: &str, len: usize, capacity: usize) -> Result<()> {
    if len > capacity {
        return Err(Error::Gpu(format!(
            "{} count {} exceeds buffer capacity {}",
            what, len, capacity
        )));
    }
    Ok(())
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub struct GrassBuffers {
    blade_buffer: wgpu::Buffer,
    pressure_buffer: wgpu::Buffer,
    collider_buffer: wgpu::Buffer,
    force_params_buffer: wgpu::Buffer,
    visible_buffer: wgpu::Buffer,
    indirect_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    capacity: usize,
    pressure_cells: usize,
}

impl GrassBuffers {
    /// Allocate buffers for patches of up to `capacity` blades.
    pub fn new(device: &wgpu::Device, capacity: usize, pressure_block_size: u32) -> Self {
        let sizes = GrassBufferSizes::for_capacity(capacity, pressure_block_size);

        let create = |label: &str, size: u64, usage: wgpu::BufferUsages| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let storage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let blade_buffer = create("grass_blades", sizes.blades, storage | wgpu::BufferUsages::VERTEX);
        let pressure_buffer = create("grass_pressure", sizes.pressure, storage);
        let collider_buffer = create("grass_colliders", sizes.colliders, storage);
        let force_params_buffer = create(
            "grass_force_params",
            sizes.force_params,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let visible_buffer = create("grass_visible_indices", sizes.visible, storage | wgpu::BufferUsages::COPY_SRC);
        let indirect_buffer = create("grass_indirect", sizes.indirect, storage | wgpu::BufferUsages::INDIRECT);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grass_bind_group_layout"),
            entries: &[
                storage_entry(BLADES_BINDING, false),
                storage_entry(PRESSURE_BINDING, false),
                storage_entry(COLLIDERS_BINDING, true),
                wgpu::BindGroupLayoutEntry {
                    binding: FORCE_PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_entry(VISIBLE_BINDING, false),
                storage_entry(INDIRECT_BINDING, false),
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("grass_bind_group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: BLADES_BINDING, resource: blade_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: PRESSURE_BINDING, resource: pressure_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: COLLIDERS_BINDING, resource: collider_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: FORCE_PARAMS_BINDING,
                    resource: force_params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry { binding: VISIBLE_BINDING, resource: visible_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: INDIRECT_BINDING, resource: indirect_buffer.as_entire_binding() },
            ],
        });

        log::debug!(
            "Allocated grass buffers for {} blades ({:.1} KB)",
            capacity,
            sizes.total() as f64 / 1024.0
        );

        Self {
            blade_buffer,
            pressure_buffer,
            collider_buffer,
            force_params_buffer,
            visible_buffer,
            indirect_buffer,
            bind_group_layout,
            bind_group,
            capacity: capacity.max(1),
            pressure_cells: (pressure_block_size.max(1) as usize).pow(2),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Upload a patch's blades, visible list and draw record.
    pub fn upload_patch(&self, queue: &wgpu::Queue, patch: &GrassPatch) -> Result<()> {
        check_fits("Blade", patch.len(), self.capacity)?;
        queue.write_buffer(&self.blade_buffer, 0, patch.blades().as_bytes());

        let visible = patch.visible_list().to_vec();
        if !visible.is_empty() {
            queue.write_buffer(&self.visible_buffer, 0, bytemuck::cast_slice(&visible));
        }
        queue.write_buffer(&self.indirect_buffer, 0, bytemuck::bytes_of(&patch.draw_record()));
        Ok(())
    }

    pub fn upload_pressure(&self, queue: &wgpu::Queue, block: &PressureBlock) -> Result<()> {
        check_fits("Pressure cell", block.cells().len(), self.pressure_cells)?;
        queue.write_buffer(&self.pressure_buffer, 0, bytemuck::cast_slice(block.cells()));
        Ok(())
    }

    /// Upload the force uniform and the colliders it counts.
    pub fn upload_forces(&self, queue: &wgpu::Queue, params: &GpuForceParams, colliders: &[Sphere]) -> Result<()> {
        check_fits("Collider", colliders.len(), MAX_SPHERE_COLLIDERS)?;
        queue.write_buffer(&self.force_params_buffer, 0, bytemuck::bytes_of(params));
        if !colliders.is_empty() {
            let packed: Vec<GpuSphere> = colliders.iter().copied().map(GpuSphere::from).collect();
            queue.write_buffer(&self.collider_buffer, 0, bytemuck::cast_slice(&packed));
        }
        Ok(())
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn blade_buffer(&self) -> &wgpu::Buffer {
        &self.blade_buffer
    }

    pub fn visible_buffer(&self) -> &wgpu::Buffer {
        &self.visible_buffer
    }

    /// Indirect buffer, consumed by `draw_indexed_indirect`
    pub fn indirect_buffer(&self) -> &wgpu::Buffer {
        &self.indirect_buffer
    }
}
