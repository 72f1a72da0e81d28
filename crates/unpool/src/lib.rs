//! MaxUnpool for channel-last tensors.
//!
//! The crate inverts max pooling: it takes pooled values plus the indices recorded by the
//! pooling op and scatters the values back into a zero-filled tensor of the pre-pooling
//! shape. Indices from a generic pooling op go through [`ops::scatter_nchw_indices`]; indices
//! from an accelerated engine's own pooling are handed to that engine through the
//! [`engine::AcceleratedEngine`] contract.

pub mod context;
pub mod engine;
mod env;
pub mod error;
pub mod kernel;
pub mod node;
pub mod ops;
pub mod tensor;
pub mod thread;

pub use context::{HostAllocator, KernelAllocator, KernelContext};
pub use engine::{AcceleratedEngine, EngineStatus, Unpooling2dDescriptor};
pub use error::{ErrorKind, Result, UnpoolError};
pub use kernel::{ExecutionPath, MaxUnpool};
pub use node::NodeDescriptor;
pub use ops::PoolAttributes;
pub use tensor::{DType, Tensor, TensorRef};
pub use thread::ThreadPool;

/// Environment-driven defaults (`UNPOOL_ENGINE`, `UNPOOL_NUM_THREADS`,
/// `UNPOOL_MIN_PARALLEL_COST`).
pub mod config {
    pub use crate::env::{
        engine_name, min_parallel_cost, num_threads, DEFAULT_ENGINE, DEFAULT_MIN_PARALLEL_COST,
    };
}
