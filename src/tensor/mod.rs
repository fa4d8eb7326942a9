//! Dense host tensors with compile-time rank
//!
//! Activations and trained weights are always `f32` on the host side;
//! reduced-precision element types only exist inside converted model
//! buffers.

pub mod core;

// Re-export main types for convenience
pub use core::{DType, Shape, Tensor};
