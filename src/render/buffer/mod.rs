//! GPU buffer management

pub mod grass_buffer;

pub use grass_buffer::{GrassBufferSizes, GrassBuffers};
