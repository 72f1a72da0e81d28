use std::sync::Arc;

use anyhow::{ensure, Context, Result};

use unpool::engine::{AcceleratedEngine, EngineOperator, Unpooling2dDescriptor};
use unpool::kernel::ExecutionPath;
use unpool::ops::narrow_indices;
use unpool::{MaxUnpool, Tensor, ThreadPool, UnpoolError};

use crate::fixtures::{
    max_pool2d_nhwc_with_indices, run_kernel, seeded_values, unpool_node, PoolGeometry,
    PooledFixture,
};

fn descriptor(geometry: PoolGeometry, channels: usize) -> Unpooling2dDescriptor {
    let [pt, pl, pb, pr] = geometry.pads.map(|p| p as u32);
    Unpooling2dDescriptor {
        padding_top: pt,
        padding_right: pr,
        padding_bottom: pb,
        padding_left: pl,
        pooling_height: geometry.kernel[0] as u32,
        pooling_width: geometry.kernel[1] as u32,
        channels,
        input_pixel_stride: channels,
        output_pixel_stride: channels,
        flags: 0,
    }
}

fn pooled_fixture(seed: u64, dims: [usize; 4], geometry: PoolGeometry) -> PooledFixture {
    let input = seeded_values(seed, dims.iter().product());
    max_pool2d_nhwc_with_indices(&input, dims, geometry)
}

/// Drives one engine operator through configure and run with window-local indices.
fn run_operator<E: AcceleratedEngine + 'static>(
    engine: &Arc<E>,
    fixture: &PooledFixture,
    indices: &[i64],
    geometry: PoolGeometry,
    pool: &ThreadPool,
) -> Result<Vec<f32>> {
    let [n, ph, pw, c] = fixture.pooled_dims;
    let dyn_engine: Arc<dyn AcceleratedEngine> = engine.clone();
    let mut op = EngineOperator::create_unpooling2d(dyn_engine, &descriptor(geometry, c))
        .context("engine rejected the unpooling configuration")?;

    let mut narrowed = vec![0u32; indices.len()];
    narrow_indices(indices, &mut narrowed)?;
    let mut output = vec![f32::NAN; fixture.source_dims.iter().product()];
    op.configure(n, ph, pw, pool).context("configure step")?;
    op.run(&fixture.values, &narrowed, &mut output, pool)
        .context("run step")?;
    Ok(output)
}

pub fn unpool_matches_naive_scatter<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let fixture = pooled_fixture(1, [2, 4, 6, 3], geometry);
    let output = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::sequential(),
    )
    .unwrap();
    assert_eq!(output, fixture.expected_unpooled(fixture.source_dims));
}

pub fn rectangular_window_matches_naive_scatter<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([3, 2]);
    let fixture = pooled_fixture(2, [1, 6, 4, 5], geometry);
    let output = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::sequential(),
    )
    .unwrap();
    assert_eq!(output, fixture.expected_unpooled(fixture.source_dims));
}

pub fn leading_padding_is_cropped<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]).with_pads([1, 1, 0, 0]);
    let fixture = pooled_fixture(3, [1, 5, 5, 2], geometry);
    assert_eq!(fixture.pooled_dims, [1, 3, 3, 2]);
    let output = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::sequential(),
    )
    .unwrap();
    assert_eq!(output, fixture.expected_unpooled(fixture.source_dims));
}

pub fn parallel_run_matches_sequential<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let fixture = pooled_fixture(4, [3, 16, 12, 8], geometry);
    let sequential = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::sequential(),
    )
    .unwrap();
    let parallel = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::with_threads(4).with_min_block_cost(1.0),
    )
    .unwrap();
    assert_eq!(sequential, parallel);
    assert_eq!(parallel, fixture.expected_unpooled(fixture.source_dims));
}

pub fn reconfigure_handles_new_batch<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let small = pooled_fixture(5, [1, 4, 4, 2], geometry);
    let large = pooled_fixture(6, [3, 4, 4, 2], geometry);
    let pool = ThreadPool::sequential();

    let dyn_engine: Arc<dyn AcceleratedEngine> = engine.clone();
    let mut op = EngineOperator::create_unpooling2d(dyn_engine, &descriptor(geometry, 2)).unwrap();
    for fixture in [&small, &large, &small] {
        let [n, ph, pw, _] = fixture.pooled_dims;
        let mut narrowed = vec![0u32; fixture.window_indices.len()];
        narrow_indices(&fixture.window_indices, &mut narrowed).unwrap();
        let mut output = vec![0.0; fixture.source_dims.iter().product()];
        op.configure(n, ph, pw, &pool).unwrap();
        op.run(&fixture.values, &narrowed, &mut output, &pool).unwrap();
        assert_eq!(output, fixture.expected_unpooled(fixture.source_dims));
    }
}

pub fn rejects_index_outside_window<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let fixture = pooled_fixture(7, [1, 4, 4, 1], geometry);
    let mut indices = fixture.window_indices.clone();
    indices[2] = 4;
    let err = run_operator(
        engine,
        &fixture,
        &indices,
        geometry,
        &ThreadPool::sequential(),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<UnpoolError>(),
        Some(UnpoolError::EngineInvocation { .. })
    ));
}

/// Engine-produced indices through the kernel must agree with external indices through the
/// generic scatter.
pub fn kernel_paths_agree<E: AcceleratedEngine + 'static>(engine: &Arc<E>) {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let fixture = pooled_fixture(8, [2, 6, 4, 3], geometry);
    let pool = ThreadPool::sequential();
    let values = Tensor::from_f32(fixture.pooled_dims, fixture.values.clone()).unwrap();

    let dyn_engine: Arc<dyn AcceleratedEngine> = engine.clone();
    let mut accelerated = MaxUnpool::new(
        &unpool_node(fixture.pooled_dims, geometry, 1, Some(fixture.source_dims)),
        Some(dyn_engine),
    )
    .unwrap();
    assert_eq!(accelerated.execution_path(), ExecutionPath::Accelerated);
    let window = Tensor::from_i64(fixture.pooled_dims, fixture.window_indices.clone()).unwrap();
    let shape = Tensor::from_i64([4], vec![2, 3, 6, 4]).unwrap();
    let accelerated_out =
        run_kernel(&mut accelerated, &values, &window, Some(&shape), &pool).unwrap();

    let mut generic =
        MaxUnpool::new(&unpool_node(fixture.pooled_dims, geometry, 0, None), None).unwrap();
    let flat = Tensor::from_i64(fixture.pooled_dims, fixture.nchw_indices.clone()).unwrap();
    let generic_out = run_kernel(&mut generic, &values, &flat, None, &pool).unwrap();

    assert_eq!(accelerated_out.dims(), &fixture.source_dims);
    assert_eq!(generic_out.dims(), &fixture.source_dims);
    assert_eq!(accelerated_out.data(), generic_out.data());
}

/// Checks one engine run end to end, returning an error instead of panicking.
pub fn check_engine<E: AcceleratedEngine + 'static>(engine: &Arc<E>) -> Result<()> {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let fixture = pooled_fixture(9, [1, 2, 2, 1], geometry);
    let output = run_operator(
        engine,
        &fixture,
        &fixture.window_indices,
        geometry,
        &ThreadPool::sequential(),
    )?;
    ensure!(
        output == fixture.expected_unpooled(fixture.source_dims),
        "engine {} produced {output:?}",
        engine.engine_name()
    );
    Ok(())
}
