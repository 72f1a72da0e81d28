//! Host-backed tensors used by the host kernel context, fixtures, and tests.

use super::dtype::DType;
use crate::error::{Result, UnpoolError};

/// Owned tensor payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

/// Simple host-backed tensor with a dense row-major payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    dims: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Constructs an `F32` tensor, validating the length against the dims.
    pub fn from_f32(dims: impl Into<Vec<usize>>, data: Vec<f32>) -> Result<Self> {
        let dims = dims.into();
        check_len(&dims, data.len())?;
        Ok(Tensor {
            dims,
            data: TensorData::F32(data),
        })
    }

    /// Constructs an `I64` tensor, validating the length against the dims.
    pub fn from_i64(dims: impl Into<Vec<usize>>, data: Vec<i64>) -> Result<Self> {
        let dims = dims.into();
        check_len(&dims, data.len())?;
        Ok(Tensor {
            dims,
            data: TensorData::I64(data),
        })
    }

    /// Returns a zero-initialized `F32` tensor.
    pub fn zeros(dims: impl Into<Vec<usize>>) -> Self {
        let dims = dims.into();
        let len = dims.iter().product();
        Tensor {
            dims,
            data: TensorData::F32(vec![0.0; len]),
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self.data {
            TensorData::F32(_) => DType::F32,
            TensorData::I64(_) => DType::I64,
        }
    }

    /// Borrows the `f32` payload, panicking if the dtype differs.
    pub fn data(&self) -> &[f32] {
        match &self.data {
            TensorData::F32(values) => values,
            _ => panic!("tensor data is not stored as f32"),
        }
    }

    /// Mutably borrows the `f32` payload, panicking if the dtype differs.
    pub fn data_mut(&mut self) -> &mut [f32] {
        match &mut self.data {
            TensorData::F32(values) => values,
            _ => panic!("tensor data is not stored as mutable f32"),
        }
    }

    /// Borrows the `i64` payload, panicking if the dtype differs.
    pub fn data_i64(&self) -> &[i64] {
        match &self.data {
            TensorData::I64(values) => values,
            _ => panic!("tensor data is not stored as i64"),
        }
    }

    /// Borrowed view handed to kernels.
    pub fn view(&self) -> TensorRef<'_> {
        match &self.data {
            TensorData::F32(values) => TensorRef::F32 {
                dims: &self.dims,
                data: values,
            },
            TensorData::I64(values) => TensorRef::I64 {
                dims: &self.dims,
                data: values,
            },
        }
    }
}

/// Borrowed, typed tensor view. Copyable so kernels can hold it across allocator calls.
#[derive(Debug, Clone, Copy)]
pub enum TensorRef<'a> {
    F32 { dims: &'a [usize], data: &'a [f32] },
    I64 { dims: &'a [usize], data: &'a [i64] },
}

impl<'a> TensorRef<'a> {
    pub fn dims(&self) -> &'a [usize] {
        match *self {
            TensorRef::F32 { dims, .. } | TensorRef::I64 { dims, .. } => dims,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorRef::F32 { .. } => DType::F32,
            TensorRef::I64 { .. } => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        match *self {
            TensorRef::F32 { data, .. } => data.len(),
            TensorRef::I64 { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `f32` payload or an input error naming `index`.
    pub fn as_f32(&self, index: usize) -> Result<&'a [f32]> {
        match *self {
            TensorRef::F32 { data, .. } => Ok(data),
            other => Err(UnpoolError::invalid_input(
                index,
                format!("expected f32 data, got {}", other.dtype().name()),
            )),
        }
    }

    /// Returns the `i64` payload or an input error naming `index`.
    pub fn as_i64(&self, index: usize) -> Result<&'a [i64]> {
        match *self {
            TensorRef::I64 { data, .. } => Ok(data),
            other => Err(UnpoolError::invalid_input(
                index,
                format!("expected i64 data, got {}", other.dtype().name()),
            )),
        }
    }
}

fn check_len(dims: &[usize], len: usize) -> Result<()> {
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| UnpoolError::invalid_shape(format!("element count of {dims:?} overflows")))?;
    if expected != len {
        return Err(UnpoolError::invalid_shape(format!(
            "tensor data length ({len}) does not match dims {dims:?}"
        )));
    }
    Ok(())
}
