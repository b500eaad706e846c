//! Deformation (pressure) field.
//!
//! Each cell holds the tip displacement from the idle pose in `xyz` and the
//! accumulated collision force in `w`. The field is tiled into square blocks,
//! one per patch, so a whole frame's worth of patches shares one image.

use glam::{UVec2, Vec4};

use crate::core::{Error, Result};

/// One patch's square block of deformation cells.
#[derive(Clone, Debug)]
pub struct PressureBlock {
    offset: UVec2,
    block_size: u32,
    cells: Vec<Vec4>,
}

impl PressureBlock {
    pub fn new(offset: UVec2, block_size: u32) -> Self {
        let n = (block_size * block_size) as usize;
        Self { offset, block_size, cells: vec![Vec4::ZERO; n] }
    }

    /// Block coordinate inside the pressure map grid.
    pub fn offset(&self) -> UVec2 {
        self.offset
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, id: usize) -> Vec4 {
        self.cells.get(id).copied().unwrap_or(Vec4::ZERO)
    }

    pub fn cells(&self) -> &[Vec4] {
        &self.cells
    }

    /// Mutable cells for the first `count` blade ids.
    pub fn cells_mut(&mut self, count: usize) -> Result<&mut [Vec4]> {
        if count > self.cells.len() {
            return Err(Error::Capacity(format!(
                "{} blades exceed pressure block capacity {}",
                count,
                self.cells.len()
            )));
        }
        Ok(&mut self.cells[..count])
    }

    /// Image texel owned by blade `id`.
    pub fn texel(&self, id: u32) -> UVec2 {
        texel(self.offset, self.block_size, id)
    }

    pub fn clear(&mut self) {
        self.cells.fill(Vec4::ZERO);
    }
}

/// Image coordinate of blade `id` inside the block at `offset`.
pub fn texel(offset: UVec2, block_size: u32, id: u32) -> UVec2 {
    offset * block_size + UVec2::new(id % block_size, id / block_size)
}

/// All patch blocks laid out on a near-square grid.
#[derive(Clone, Debug)]
pub struct PressureMap {
    block_size: u32,
    grid: UVec2,
    blocks: Vec<PressureBlock>,
}

impl PressureMap {
    /// Reserve one `block_size²` block per patch.
    pub fn new(block_size: u32, patch_count: usize) -> Self {
        let block_size = block_size.max(1);
        let grid = grid_dimensions(patch_count);
        let blocks = (0..patch_count as u32)
            .map(|k| PressureBlock::new(UVec2::new(k % grid.x, k / grid.x), block_size))
            .collect();

        log::debug!(
            "Pressure map: {} blocks of {}x{} on a {}x{} grid",
            patch_count, block_size, block_size, grid.x, grid.y
        );

        Self { block_size, grid, blocks }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Grid size in blocks (columns, rows).
    pub fn grid(&self) -> UVec2 {
        self.grid
    }

    /// Full image size in texels.
    pub fn dimensions(&self) -> UVec2 {
        self.grid * self.block_size
    }

    pub fn block(&self, patch: usize) -> Option<&PressureBlock> {
        self.blocks.get(patch)
    }

    pub fn block_mut(&mut self, patch: usize) -> Option<&mut PressureBlock> {
        self.blocks.get_mut(patch)
    }

    pub fn blocks_mut(&mut self) -> &mut [PressureBlock] {
        &mut self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        for block in &mut self.blocks {
            block.clear();
        }
    }

    /// Flatten into a row-major RGBA32F image for upload.
    pub fn to_image(&self) -> Vec<[f32; 4]> {
        let dims = self.dimensions();
        let mut image = vec![[0.0f32; 4]; (dims.x * dims.y) as usize];
        for block in &self.blocks {
            for (id, cell) in block.cells.iter().enumerate() {
                let t = block.texel(id as u32);
                image[(t.y * dims.x + t.x) as usize] = cell.to_array();
            }
        }
        image
    }
}

/// `rows = floor(sqrt(n))`, `cols = ceil(n / rows)`
fn grid_dimensions(patch_count: usize) -> UVec2 {
    if patch_count == 0 {
        return UVec2::ZERO;
    }
    let rows = ((patch_count as f64).sqrt().floor() as u32).max(1);
    let cols = (patch_count as u32).div_ceil(rows);
    UVec2::new(cols, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_grid_dimensions() {
        assert_eq!(grid_dimensions(0), UVec2::ZERO);
        assert_eq!(grid_dimensions(1), UVec2::new(1, 1));
        assert_eq!(grid_dimensions(5), UVec2::new(3, 2));
        assert_eq!(grid_dimensions(9), UVec2::new(3, 3));
        assert_eq!(grid_dimensions(10), UVec2::new(4, 3));
    }

    #[test]
    fn test_unique_block_offsets() {
        let map = PressureMap::new(4, 10);
        let offsets: HashSet<_> = (0..10).map(|k| map.block(k).unwrap().offset()).collect();
        assert_eq!(offsets.len(), 10);
        for o in offsets {
            assert!(o.x < map.grid().x && o.y < map.grid().y);
        }
    }

    #[test]
    fn test_texels_do_not_alias() {
        let map = PressureMap::new(3, 4);
        let mut seen = HashSet::new();
        for k in 0..4 {
            let block = map.block(k).unwrap();
            for id in 0..9 {
                assert!(seen.insert(block.texel(id)));
            }
        }
        assert_eq!(seen.len(), 36);
    }

    #[test]
    fn test_texel_layout() {
        assert_eq!(texel(UVec2::new(1, 2), 10, 0), UVec2::new(10, 20));
        assert_eq!(texel(UVec2::new(1, 2), 10, 23), UVec2::new(13, 22));
    }

    #[test]
    fn test_capacity_error() {
        let mut block = PressureBlock::new(UVec2::ZERO, 2);
        assert_eq!(block.cells_mut(4).unwrap().len(), 4);
        assert!(matches!(block.cells_mut(5), Err(Error::Capacity(_))));
    }

    #[test]
    fn test_to_image_and_clear() {
        let mut map = PressureMap::new(2, 2);
        map.block_mut(1).unwrap().cells_mut(4).unwrap()[3] = Vec4::new(1.0, 2.0, 3.0, 4.0);

        let image = map.to_image();
        assert_eq!(map.dimensions(), UVec2::new(4, 2));
        assert_eq!(image.len(), 8);
        // block 1 sits at (1, 0); id 3 is (1, 1) inside it -> texel (3, 1)
        assert_eq!(image[4 + 3], [1.0, 2.0, 3.0, 4.0]);

        map.clear();
        assert!(map.to_image().iter().all(|c| *c == [0.0; 4]));
    }
}
