//! GPU-side mirrors of the grass pipeline state

pub mod buffer;

pub use buffer::GrassBuffers;
