//! Generic MaxUnpool scatter for indices produced outside the accelerated engine.
//!
//! Inputs are channel-last. The index tensor holds one entry per input element but is laid
//! out channel-first, and every entry is a channel-first flat offset into the output. Writes
//! are resolved in two phases: destinations are decoded (and bounds-checked) in parallel over
//! the `N x H x W` grid, then applied sequentially in source order. When two sources hit the
//! same slot the later one in `n, h, w, c` order wins, regardless of how the pool scheduled
//! the decode.

use tracing::trace;

use super::index::{encode_coord, remap_flat_index, Coord4, Dims4, Layout};
use crate::error::{Result, UnpoolError};
use crate::thread::{TensorOpCost, ThreadPool};

/// Per input element: read value + index, store the decoded destination.
const SCATTER_COST_PER_ELEMENT: TensorOpCost = TensorOpCost::new(12.0, 8.0, 10.0);

/// Scatters `input` into a zero-filled `output` following channel-first `indices`.
pub fn scatter_nchw_indices<T>(
    input: &[T],
    indices: &[i64],
    input_dims: Dims4,
    output_dims: Dims4,
    output: &mut [T],
    pool: &ThreadPool,
) -> Result<()>
where
    T: Copy + Default + Send + Sync,
{
    check_lengths(input, indices, input_dims, output_dims, output)?;

    output.fill(T::default());

    let destinations = decode_destinations(indices, input_dims, output_dims, pool)?;
    for (source, &destination) in destinations.iter().enumerate() {
        output[destination] = input[source];
    }

    trace!(
        target: "unpool::scatter",
        elements = input.len(),
        output_elements = output.len(),
        "generic scatter complete"
    );
    Ok(())
}

/// Decodes, for every channel-last input offset, the channel-last output offset it writes to.
pub fn decode_destinations(
    indices: &[i64],
    input_dims: Dims4,
    output_dims: Dims4,
    pool: &ThreadPool,
) -> Result<Vec<usize>> {
    let len = input_dims.num_elements();
    let mut destinations: Vec<usize> = Vec::new();
    destinations
        .try_reserve_exact(len)
        .map_err(|_| UnpoolError::Allocation {
            what: "scatter destinations",
            requested_bytes: len.saturating_mul(std::mem::size_of::<usize>()),
        })?;
    destinations.resize(len, 0);

    let channels = input_dims.c;
    let spatial = input_dims.spatial();
    let rows = input_dims.n * spatial;
    let cost = SCATTER_COST_PER_ELEMENT.scaled(channels as f64);

    let process = |row_start: usize, row_end: usize, chunk: &mut [usize]| -> Result<()> {
        let mut slots = chunk.chunks_exact_mut(channels);
        for row in row_start..row_end {
            let n = row / spatial;
            let hw = row % spatial;
            let row_slots = slots.next().ok_or_else(|| {
                UnpoolError::invalid_shape("scatter partition shorter than its rows")
            })?;
            for (c, slot) in row_slots.iter_mut().enumerate() {
                let position = encode_coord(
                    Coord4 {
                        n,
                        c,
                        h: hw / input_dims.w,
                        w: hw % input_dims.w,
                    },
                    input_dims,
                    Layout::Nchw,
                );
                let value = indices[position];
                *slot = remap_flat_index(value, output_dims, Layout::Nchw, Layout::Nhwc).map_err(
                    |_| UnpoolError::IndexOutOfBounds {
                        position,
                        value,
                        limit: output_dims.num_elements(),
                    },
                )?;
            }
        }
        Ok(())
    };

    if channels > 0 {
        pool.parallel_for_rows(rows, channels, cost, &mut destinations, &process)?;
    }
    Ok(destinations)
}

fn check_lengths<T>(
    input: &[T],
    indices: &[i64],
    input_dims: Dims4,
    output_dims: Dims4,
    output: &[T],
) -> Result<()> {
    if input.len() != input_dims.num_elements() {
        return Err(UnpoolError::invalid_input(
            0,
            format!(
                "holds {} elements but dims {:?} need {}",
                input.len(),
                input_dims.to_nhwc(),
                input_dims.num_elements()
            ),
        ));
    }
    if indices.len() != input.len() {
        return Err(UnpoolError::invalid_input(
            1,
            format!(
                "holds {} indices for {} input elements",
                indices.len(),
                input.len()
            ),
        ));
    }
    if output_dims.n != input_dims.n || output_dims.c != input_dims.c {
        return Err(UnpoolError::ShapeMismatch {
            context: "scatter batch/channel",
            expected: vec![input_dims.n, input_dims.c],
            actual: vec![output_dims.n, output_dims.c],
        });
    }
    if output.len() != output_dims.num_elements() {
        return Err(UnpoolError::invalid_shape(format!(
            "output buffer holds {} elements, dims {:?} need {}",
            output.len(),
            output_dims.to_nhwc(),
            output_dims.num_elements()
        )));
    }
    Ok(())
}
