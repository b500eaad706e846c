//! Tussock - responsive grass simulation with culling and indirect draw output

pub mod core;
pub mod math;
pub mod grass;
pub mod render;
