use std::sync::Arc;

use tracing::{debug, warn};
use unpool::engine::{AcceleratedEngine, EngineStatus, RawOperator, Unpooling2dDescriptor};
use unpool::thread::TensorOpCost;
use unpool::{ThreadPool, UnpoolError};

/// Portable engine that unpools with a row-parallel gather.
///
/// Each output pixel `(oy, ox)` maps back to input pixel `((oy + top) / kh, (ox + left) / kw)`
/// and window slot `((oy + top) % kh) * kw + (ox + left) % kw`; it receives the input value
/// when the recorded index names that slot and zero otherwise. Output rows never overlap, so
/// rows can be filled independently.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceEngine;

impl ReferenceEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn create() -> Arc<dyn AcceleratedEngine> {
        Arc::new(Self)
    }
}

#[derive(Debug, Clone, Copy)]
struct Extents {
    batch: usize,
    height: usize,
    width: usize,
    out_height: usize,
    out_width: usize,
}

#[derive(Debug)]
struct UnpoolingOperator {
    desc: Unpooling2dDescriptor,
    /// Number of slots in one pooling window, `pooling_height * pooling_width`.
    window: usize,
    extents: Option<Extents>,
}

fn operator_mut(op: &mut RawOperator) -> Result<&mut UnpoolingOperator, EngineStatus> {
    op.downcast_mut::<UnpoolingOperator>()
        .ok_or(EngineStatus::InvalidParameter)
}

impl AcceleratedEngine for ReferenceEngine {
    fn engine_name(&self) -> &str {
        "reference"
    }

    fn create_unpooling2d(&self, desc: &Unpooling2dDescriptor) -> Result<RawOperator, EngineStatus> {
        // 1x1 windows are rejected along with empty ones. Slots must be addressable as u32.
        let window = desc
            .pooling_height
            .checked_mul(desc.pooling_width)
            .ok_or(EngineStatus::InvalidParameter)?;
        if window <= 1 {
            return Err(EngineStatus::InvalidParameter);
        }
        if desc.channels == 0
            || desc.input_pixel_stride < desc.channels
            || desc.output_pixel_stride < desc.channels
        {
            return Err(EngineStatus::InvalidParameter);
        }
        if desc.flags != 0 {
            return Err(EngineStatus::UnsupportedParameter);
        }
        Ok(Box::new(UnpoolingOperator {
            desc: *desc,
            window: window as usize,
            extents: None,
        }))
    }

    fn reshape_unpooling2d(
        &self,
        op: &mut RawOperator,
        batch: usize,
        height: usize,
        width: usize,
        _pool: &ThreadPool,
    ) -> Result<(), EngineStatus> {
        let op = operator_mut(op)?;
        op.extents = None;
        let (out_height, out_width) = op
            .desc
            .output_extent(height, width)
            .ok_or(EngineStatus::InvalidParameter)?;
        if height > 0 && width > 0 && (out_height == 0 || out_width == 0) {
            return Err(EngineStatus::InvalidParameter);
        }
        op.extents = Some(Extents {
            batch,
            height,
            width,
            out_height,
            out_width,
        });
        Ok(())
    }

    fn run_unpooling2d(
        &self,
        op: &mut RawOperator,
        input: &[f32],
        indices: &[u32],
        output: &mut [f32],
        pool: &ThreadPool,
    ) -> Result<(), EngineStatus> {
        let op = operator_mut(op)?;
        let extents = op.extents.ok_or(EngineStatus::InvalidState)?;
        let desc = op.desc;
        let window = op.window;

        let pixels = extents.batch * extents.height * extents.width;
        let out_pixels = extents.batch * extents.out_height * extents.out_width;
        if input.len() != pixels * desc.input_pixel_stride
            || indices.len() != pixels * desc.channels
            || output.len() != out_pixels * desc.output_pixel_stride
        {
            return Err(EngineStatus::InvalidParameter);
        }
        if out_pixels == 0 {
            return Ok(());
        }

        let rows = extents.batch * extents.out_height;
        let row_width = extents.out_width * desc.output_pixel_stride;
        let per_row = (extents.out_width * desc.channels) as f64;
        let cost = TensorOpCost::new(8.0, 4.0, 4.0).scaled(per_row);

        let process = |row_start: usize, row_end: usize, out_rows: &mut [f32]| -> unpool::Result<()> {
            for (row, out_row) in (row_start..row_end).zip(out_rows.chunks_exact_mut(row_width)) {
                gather_row(&desc, &extents, window, row, input, indices, out_row)?;
            }
            Ok(())
        };

        pool.parallel_for_rows(rows, row_width, cost, output, &process)
            .map_err(|err| {
                warn!(target: "unpool::engine::reference", %err, "unpooling run rejected");
                EngineStatus::InvalidParameter
            })?;

        debug!(
            target: "unpool::engine::reference",
            batch = extents.batch,
            out_height = extents.out_height,
            out_width = extents.out_width,
            "unpooling run complete"
        );
        Ok(())
    }

    fn destroy_operator(&self, op: RawOperator) {
        drop(op);
    }
}

fn gather_row(
    desc: &Unpooling2dDescriptor,
    extents: &Extents,
    window: usize,
    row: usize,
    input: &[f32],
    indices: &[u32],
    out_row: &mut [f32],
) -> unpool::Result<()> {
    let kh = desc.pooling_height as usize;
    let kw = desc.pooling_width as usize;
    let channels = desc.channels;

    let n = row / extents.out_height;
    let padded_y = row % extents.out_height + desc.padding_top as usize;
    let (iy, ky) = (padded_y / kh, padded_y % kh);

    for (ox, out_pixel) in out_row
        .chunks_exact_mut(desc.output_pixel_stride)
        .enumerate()
    {
        let padded_x = ox + desc.padding_left as usize;
        let (ix, kx) = (padded_x / kw, padded_x % kw);
        let slot = ky * kw + kx;
        let pixel = (n * extents.height + iy) * extents.width + ix;
        let source = &input[pixel * desc.input_pixel_stride..][..channels];
        let recorded = &indices[pixel * channels..][..channels];

        for ((out, &value), &index) in out_pixel[..channels].iter_mut().zip(source).zip(recorded) {
            let index = index as usize;
            if index >= window {
                return Err(UnpoolError::IndexOutOfBounds {
                    position: pixel * channels,
                    value: index as i64,
                    limit: window,
                });
            }
            *out = if index == slot { value } else { 0.0 };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kernel: u32, channels: usize) -> Unpooling2dDescriptor {
        Unpooling2dDescriptor {
            padding_top: 0,
            padding_right: 0,
            padding_bottom: 0,
            padding_left: 0,
            pooling_height: kernel,
            pooling_width: kernel,
            channels,
            input_pixel_stride: channels,
            output_pixel_stride: channels,
            flags: 0,
        }
    }

    #[test]
    fn run_before_reshape_is_an_invalid_state() {
        let engine = ReferenceEngine::new();
        let pool = ThreadPool::sequential();
        let mut op = engine.create_unpooling2d(&descriptor(2, 1)).unwrap();
        let mut out = [0.0; 4];
        assert_eq!(
            engine.run_unpooling2d(&mut op, &[1.0], &[0], &mut out, &pool),
            Err(EngineStatus::InvalidState)
        );
        engine.destroy_operator(op);
    }

    #[test]
    fn single_window_places_value_at_recorded_slot() {
        let engine = ReferenceEngine::new();
        let pool = ThreadPool::sequential();
        let mut op = engine.create_unpooling2d(&descriptor(2, 2)).unwrap();
        engine.reshape_unpooling2d(&mut op, 1, 1, 1, &pool).unwrap();
        let mut out = [f32::NAN; 8];
        engine
            .run_unpooling2d(&mut op, &[5.0, 6.0], &[3, 1], &mut out, &pool)
            .unwrap();
        assert_eq!(out, [0.0, 0.0, 0.0, 6.0, 0.0, 0.0, 5.0, 0.0]);
    }

    #[test]
    fn degenerate_descriptors_are_rejected() {
        let engine = ReferenceEngine::new();
        assert_eq!(
            engine.create_unpooling2d(&descriptor(1, 4)).err(),
            Some(EngineStatus::InvalidParameter)
        );
        assert_eq!(
            engine.create_unpooling2d(&descriptor(2, 0)).err(),
            Some(EngineStatus::InvalidParameter)
        );
        // 65536 * 65536 does not fit in a u32 slot index.
        assert_eq!(
            engine.create_unpooling2d(&descriptor(65536, 1)).err(),
            Some(EngineStatus::InvalidParameter)
        );
    }

    #[test]
    fn largest_addressable_window_is_accepted() {
        let engine = ReferenceEngine::new();
        let mut desc = descriptor(1, 1);
        desc.pooling_height = 65535;
        desc.pooling_width = 65537;
        let op = engine.create_unpooling2d(&desc).unwrap();
        engine.destroy_operator(op);
    }
}
