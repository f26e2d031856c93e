//! Kernel access for the layer: the raw invoker and typed wrappers over it.

pub mod fs;
pub mod raw;
