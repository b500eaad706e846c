//! Indirect draw record written after culling.

use bytemuck::{Pod, Zeroable};

use super::config::DrawConfig;
use super::visibility::VisibleIndexList;

/// `DrawElementsIndirect` command (20 bytes), laid out as the graphics API
/// expects it in an indirect buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawElementsIndirect {
    pub count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

impl DrawElementsIndirect {
    pub fn from_config(count: u32, draw: &DrawConfig) -> Self {
        Self {
            count,
            instance_count: draw.instance_count,
            first_index: draw.first_index,
            base_vertex: draw.base_vertex,
            base_instance: draw.base_instance,
        }
    }
}

/// Write the visible count into the draw record.
///
/// Takes the list by shared reference after the culling dispatch returned,
/// which is the point every append is visible.
pub fn finalize(list: &VisibleIndexList, draw: &DrawConfig, record: &mut DrawElementsIndirect) {
    *record = DrawElementsIndirect::from_config(list.count(), draw);
}
