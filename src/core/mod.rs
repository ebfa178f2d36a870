//! Foundation layer: types, time-ordered buffers and math helpers.

pub mod buffer;
pub mod math;
pub mod types;
