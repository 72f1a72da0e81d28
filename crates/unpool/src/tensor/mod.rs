//! Host tensors and borrowed tensor views exchanged with the kernel context.
//!
//! Tensors handed to the kernel are always dense and row-major. Layout (channel-last vs
//! channel-first) is a property of how the kernel interprets the dims, not of the storage.

pub mod dtype;
mod host_tensor;

pub use dtype::DType;
pub use host_tensor::{Tensor, TensorData, TensorRef};
