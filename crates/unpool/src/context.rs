//! Run-time context handed to a kernel for one invocation.
//!
//! The framework owns tensor storage. A kernel sees borrowed input views, asks the
//! [`KernelAllocator`] for its output and scratch buffers, and receives the shared
//! [`ThreadPool`] it may split work across.

use crate::error::{Result, UnpoolError};
use crate::tensor::{DType, Tensor, TensorRef};
use crate::thread::ThreadPool;

/// Output and scratch allocation provided by the framework.
pub trait KernelAllocator {
    /// Allocates output `index` with `dims` and returns its writable `f32` payload.
    fn allocate_output(&mut self, index: usize, dims: &[usize]) -> Result<&mut [f32]>;

    /// Allocates a scratch buffer that lives until the caller drops it.
    fn allocate_temp_u32(&mut self, len: usize) -> Result<Vec<u32>>;
}

/// Per-invocation context.
pub struct KernelContext<'a> {
    inputs: &'a [TensorRef<'a>],
    allocator: &'a mut dyn KernelAllocator,
    pool: &'a ThreadPool,
}

impl<'a> KernelContext<'a> {
    pub fn new(
        inputs: &'a [TensorRef<'a>],
        allocator: &'a mut dyn KernelAllocator,
        pool: &'a ThreadPool,
    ) -> Self {
        Self {
            inputs,
            allocator,
            pool,
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Borrowed view of input `index`. The view outlives the `&self` borrow so it can be held
    /// across allocator calls.
    pub fn input(&self, index: usize) -> Result<TensorRef<'a>> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| UnpoolError::invalid_input(index, "input is missing"))
    }

    pub fn allocate_output(&mut self, index: usize, dims: &[usize]) -> Result<&mut [f32]> {
        self.allocator.allocate_output(index, dims)
    }

    pub fn allocate_temp_u32(&mut self, len: usize) -> Result<Vec<u32>> {
        self.allocator.allocate_temp_u32(len)
    }

    pub fn thread_pool(&self) -> &'a ThreadPool {
        self.pool
    }
}

/// Host allocator backed by `Vec`, with an optional byte budget to exercise allocation
/// failures.
#[derive(Debug, Default)]
pub struct HostAllocator {
    outputs: Vec<Option<Tensor>>,
    byte_limit: Option<usize>,
    temp_allocations: usize,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any single allocation larger than `bytes`.
    pub fn with_byte_limit(bytes: usize) -> Self {
        Self {
            byte_limit: Some(bytes),
            ..Self::default()
        }
    }

    pub fn output(&self, index: usize) -> Option<&Tensor> {
        self.outputs.get(index)?.as_ref()
    }

    pub fn take_output(&mut self, index: usize) -> Option<Tensor> {
        self.outputs.get_mut(index)?.take()
    }

    /// Number of scratch buffers handed out so far.
    pub fn temp_allocations(&self) -> usize {
        self.temp_allocations
    }

    fn check_budget(&self, what: &'static str, bytes: usize) -> Result<()> {
        match self.byte_limit {
            Some(limit) if bytes > limit => Err(UnpoolError::Allocation {
                what,
                requested_bytes: bytes,
            }),
            _ => Ok(()),
        }
    }
}

impl KernelAllocator for HostAllocator {
    fn allocate_output(&mut self, index: usize, dims: &[usize]) -> Result<&mut [f32]> {
        let len = dims
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or(UnpoolError::Allocation {
                what: "output",
                requested_bytes: usize::MAX,
            })?;
        let bytes = len.saturating_mul(DType::F32.size_in_bytes());
        self.check_budget("output", bytes)?;

        let mut data: Vec<f32> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| UnpoolError::Allocation {
                what: "output",
                requested_bytes: bytes,
            })?;
        data.resize(len, 0.0);

        if self.outputs.len() <= index {
            self.outputs.resize_with(index + 1, || None);
        }
        let tensor = self.outputs[index].insert(Tensor::from_f32(dims.to_vec(), data)?);
        Ok(tensor.data_mut())
    }

    fn allocate_temp_u32(&mut self, len: usize) -> Result<Vec<u32>> {
        let bytes = len.saturating_mul(std::mem::size_of::<u32>());
        self.check_budget("temp", bytes)?;
        let mut data: Vec<u32> = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| UnpoolError::Allocation {
                what: "temp",
                requested_bytes: bytes,
            })?;
        data.resize(len, 0);
        self.temp_allocations += 1;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_limit_rejects_oversized_outputs() {
        let mut allocator = HostAllocator::with_byte_limit(64);
        assert!(allocator.allocate_output(0, &[1, 2, 2, 4]).is_ok());
        let err = allocator.allocate_output(0, &[1, 4, 4, 2]).unwrap_err();
        assert_eq!(
            err,
            UnpoolError::Allocation {
                what: "output",
                requested_bytes: 128
            }
        );
    }

    #[test]
    fn input_views_outlive_context_borrows() {
        let x = Tensor::from_f32(vec![1, 1, 1, 1], vec![3.0]).unwrap();
        let views = [x.view()];
        let mut allocator = HostAllocator::new();
        let pool = ThreadPool::sequential();
        let mut ctx = KernelContext::new(&views, &mut allocator, &pool);
        let view = ctx.input(0).unwrap();
        let out = ctx.allocate_output(0, &[1]).unwrap();
        out[0] = view.as_f32(0).unwrap()[0];
        assert!(ctx.input(1).is_err());
        drop(ctx);
        assert_eq!(allocator.output(0).unwrap().data(), &[3.0]);
    }
}
