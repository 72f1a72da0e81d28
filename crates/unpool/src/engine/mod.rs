//! Contract with external accelerated engines and the scoped handle that owns their operators.
//!
//! An engine is consumed through four calls: create an unpooling operator from static
//! configuration, configure it with run-time extents, run it against caller buffers, and
//! destroy it. [`EngineOperator`] wraps the created operator so destruction happens exactly
//! once, on drop.

mod operator;
pub mod registry;

use std::any::Any;

use thiserror::Error;

use crate::thread::ThreadPool;

pub use operator::{EngineOperator, OperatorState};

/// Engine-owned operator state, type-erased so the trait stays object safe.
pub type RawOperator = Box<dyn Any + Send>;

/// Non-success status reported by an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum EngineStatus {
    #[error("uninitialized")]
    Uninitialized,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid state")]
    InvalidState,
    #[error("unsupported parameter")]
    UnsupportedParameter,
    #[error("unsupported hardware")]
    UnsupportedHardware,
    #[error("out of memory")]
    OutOfMemory,
    #[error("status {0}")]
    Other(i32),
}

impl EngineStatus {
    /// Numeric diagnostic code; `0` is reserved for success.
    pub fn code(self) -> i32 {
        match self {
            EngineStatus::Uninitialized => 1,
            EngineStatus::InvalidParameter => 2,
            EngineStatus::InvalidState => 3,
            EngineStatus::UnsupportedParameter => 4,
            EngineStatus::UnsupportedHardware => 5,
            EngineStatus::OutOfMemory => 6,
            EngineStatus::Other(code) => code,
        }
    }
}

/// Static configuration of a 2-D NHWC unpooling operator.
///
/// The engine's operator has an implicit stride equal to the pooling window, and indices
/// handed to [`AcceleratedEngine::run_unpooling2d`] are offsets inside that window
/// (`ky * pooling_width + kx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unpooling2dDescriptor {
    pub padding_top: u32,
    pub padding_right: u32,
    pub padding_bottom: u32,
    pub padding_left: u32,
    pub pooling_height: u32,
    pub pooling_width: u32,
    pub channels: usize,
    pub input_pixel_stride: usize,
    pub output_pixel_stride: usize,
    pub flags: u32,
}

impl Unpooling2dDescriptor {
    /// Output extents produced for an `height x width` input.
    pub fn output_extent(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let out_h = height
            .checked_mul(self.pooling_height as usize)?
            .checked_sub(self.padding_top as usize + self.padding_bottom as usize)?;
        let out_w = width
            .checked_mul(self.pooling_width as usize)?
            .checked_sub(self.padding_left as usize + self.padding_right as usize)?;
        Some((out_h, out_w))
    }
}

/// Capability set the kernel needs from an accelerated engine.
///
/// Implementations must tolerate `destroy_operator` being the last call an operator sees,
/// including right after a failed configure or run.
pub trait AcceleratedEngine: Send + Sync {
    /// Human-readable identifier used in diagnostics and the registry.
    fn engine_name(&self) -> &str;

    fn create_unpooling2d(&self, desc: &Unpooling2dDescriptor) -> Result<RawOperator, EngineStatus>;

    /// Configure step: binds run-time batch and spatial extents.
    fn reshape_unpooling2d(
        &self,
        op: &mut RawOperator,
        batch: usize,
        height: usize,
        width: usize,
        pool: &ThreadPool,
    ) -> Result<(), EngineStatus>;

    fn run_unpooling2d(
        &self,
        op: &mut RawOperator,
        input: &[f32],
        indices: &[u32],
        output: &mut [f32],
        pool: &ThreadPool,
    ) -> Result<(), EngineStatus>;

    fn destroy_operator(&self, op: RawOperator);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(pads: [u32; 4], kernel: u32) -> Unpooling2dDescriptor {
        let [top, left, bottom, right] = pads;
        Unpooling2dDescriptor {
            padding_top: top,
            padding_right: right,
            padding_bottom: bottom,
            padding_left: left,
            pooling_height: kernel,
            pooling_width: kernel,
            channels: 1,
            input_pixel_stride: 1,
            output_pixel_stride: 1,
            flags: 0,
        }
    }

    #[test]
    fn output_extent_crops_padding() {
        assert_eq!(descriptor([1, 0, 0, 2], 2).output_extent(3, 3), Some((5, 4)));
        assert_eq!(descriptor([2, 0, 2, 0], 2).output_extent(1, 1), None);
    }

    #[test]
    fn output_extent_sums_pads_without_u32_overflow() {
        let desc = descriptor([u32::MAX, u32::MAX, u32::MAX, u32::MAX], u32::MAX);
        let height = 3usize;
        let expected = height * u32::MAX as usize - 2 * u32::MAX as usize;
        assert_eq!(desc.output_extent(height, height), Some((expected, expected)));
    }
}
