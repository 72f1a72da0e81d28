//! Output shape inference for MaxUnpool on channel-last (`N, H, W, C`) tensors.

use super::attributes::PoolAttributes;
use super::index::nchw_dims_to_nhwc;
use crate::error::{Result, UnpoolError, RUNTIME_OUTPUT_SHAPE};

/// Inverts the pooling size formula on every spatial axis of an NHWC shape.
///
/// `out[d] = (in[d] - 1) * stride[d] - (pad_begin[d] + pad_end[d]) + kernel[d]`, with batch and
/// channel copied through.
pub fn infer_unpool_output_shape(attrs: &PoolAttributes, input_nhwc: [usize; 4]) -> Result<[usize; 4]> {
    let mut output = input_nhwc;
    for axis in 0..attrs.rank() {
        output[axis + 1] = unpooled_extent(
            input_nhwc[axis + 1],
            attrs.kernel_shape()[axis],
            attrs.strides()[axis],
            attrs.total_pad(axis),
        )
        .ok_or_else(|| {
            UnpoolError::invalid_shape(format!(
                "spatial axis {axis} of input {input_nhwc:?} yields no output for kernel {:?}, strides {:?}, pads {:?}",
                attrs.kernel_shape(),
                attrs.strides(),
                attrs.pads()
            ))
        })?;
    }
    Ok(output)
}

/// Unpooled extent of one axis, `None` on overflow or a non-positive result.
pub fn unpooled_extent(input: usize, kernel: usize, stride: usize, total_pad: usize) -> Option<usize> {
    if input == 0 {
        return None;
    }
    let grown = (input - 1).checked_mul(stride)?.checked_add(kernel)?;
    grown.checked_sub(total_pad).filter(|&extent| extent > 0)
}

/// Forward pooling formula: `floor((in + pad_begin + pad_end - kernel) / stride) + 1`.
pub fn pooled_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    pad_begin: usize,
    pad_end: usize,
) -> Option<usize> {
    let padded = input.checked_add(pad_begin)?.checked_add(pad_end)?;
    let span = padded.checked_sub(kernel)?;
    Some(span / stride + 1)
}

/// Converts a channel-first `output_shape` tensor (`[N, C, H, W]`) into NHWC dims.
pub fn explicit_output_shape_nhwc(values: &[i64]) -> Result<[usize; 4]> {
    let dims: [i64; 4] = values.try_into().map_err(|_| {
        UnpoolError::invalid_shape(format!(
            "output_shape must hold 4 values, got {}",
            values.len()
        ))
    })?;
    let nhwc = nchw_dims_to_nhwc(dims);
    let mut out = [0usize; 4];
    for (slot, value) in out.iter_mut().zip(nhwc) {
        *slot = usize::try_from(value).map_err(|_| {
            UnpoolError::invalid_shape(format!("output_shape holds negative extent {value}"))
        })?;
    }
    Ok(out)
}

/// Reconciles a run-time `output_shape` with the shape fixed at construction.
///
/// The explicit shape decides spatial and channel extents; it must agree with the static
/// spatial/channel dims and with the run-time batch and channel count of the input.
pub fn reconcile_runtime_output_shape(
    static_nhwc: [usize; 4],
    explicit: &[i64],
    batch: usize,
) -> Result<[usize; 4]> {
    let mut resolved = explicit_output_shape_nhwc(explicit)?;
    let mut expected = static_nhwc;
    expected[0] = batch;
    if resolved != expected {
        return Err(UnpoolError::ShapeMismatch {
            context: RUNTIME_OUTPUT_SHAPE,
            expected: expected.to_vec(),
            actual: resolved.to_vec(),
        });
    }
    resolved[0] = batch;
    Ok(resolved)
}
