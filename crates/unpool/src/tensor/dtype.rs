//! Scalar element types the unpool kernel can see on its inputs.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between node metadata and host tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point (fp16). Never accepted by the kernel, only described.
    F16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer, used for pooling indices and shape tensors.
    I64,
}

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::I32 => "i32",
            DType::I64 => "i64",
        }
    }
}
