use std::collections::HashSet;

use unpool::kernel::ExecutionPath;
use unpool::ops::{scatter_nchw_indices, Dims4};
use unpool::{MaxUnpool, Tensor, ThreadPool, UnpoolError};
use unpool_engine_tests::fixtures::{
    max_pool2d_nhwc_with_indices, run_kernel, seeded_values, unpool_node, PoolGeometry,
};

#[test]
fn single_value_lands_in_the_top_left_corner() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let mut kernel = MaxUnpool::new(&unpool_node([1, 2, 2, 1], geometry, 0, None), None).unwrap();
    assert_eq!(kernel.execution_path(), ExecutionPath::Generic);

    let x = Tensor::from_f32([1, 2, 2, 1], vec![7.5, 0.0, 0.0, 0.0]).unwrap();
    let indices = Tensor::from_i64([1, 2, 2, 1], vec![0, 2, 8, 10]).unwrap();
    let out = run_kernel(&mut kernel, &x, &indices, None, &ThreadPool::sequential()).unwrap();

    assert_eq!(out.dims(), &[1, 4, 4, 1]);
    let mut expected = vec![0.0; 16];
    expected[0] = 7.5;
    assert_eq!(out.data(), expected.as_slice());
}

#[test]
fn referenced_slots_hold_inputs_and_the_rest_stay_zero() {
    let input_dims = Dims4::from_nhwc([2, 2, 3, 4]);
    let output_dims = Dims4::from_nhwc([2, 4, 6, 4]);
    let input: Vec<f32> = (1..=input_dims.num_elements()).map(|v| v as f32).collect();
    // Distinct channel-first destinations, deliberately scrambled.
    let limit = output_dims.num_elements() as i64;
    let indices: Vec<i64> = (0..input.len() as i64).map(|i| (i * 37 + 5) % limit).collect();
    let mut output = vec![f32::NAN; output_dims.num_elements()];
    scatter_nchw_indices(
        &input,
        &indices,
        input_dims,
        output_dims,
        &mut output,
        &ThreadPool::sequential(),
    )
    .unwrap();

    let nonzero = output.iter().filter(|&&v| v != 0.0).count();
    assert_eq!(nonzero, input.len());
    assert!(nonzero <= input.len());
    let distinct: HashSet<u32> = output.iter().map(|v| v.to_bits()).collect();
    assert_eq!(distinct.len(), input.len() + 1);
}

#[test]
fn later_source_wins_on_collision() {
    let input_dims = Dims4::from_nhwc([1, 1, 2, 2]);
    let output_dims = Dims4::from_nhwc([1, 2, 2, 2]);
    // Index tensor is channel-first: [c0w0, c0w1, c1w0, c1w1]. Channel-last source order is
    // c0w0, c1w0, c0w1, c1w1, so `4.0` (c1w1) is the last write to slot 0. Offset 5 is
    // (c1, h0, w1), channel-last slot 3.
    let input = [1.0, 2.0, 3.0, 4.0];
    let indices = [0, 0, 5, 0];
    let mut output = vec![9.0; output_dims.num_elements()];
    scatter_nchw_indices(
        &input,
        &indices,
        input_dims,
        output_dims,
        &mut output,
        &ThreadPool::with_threads(4).with_min_block_cost(1.0),
    )
    .unwrap();
    assert_eq!(output, vec![4.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
}

#[test]
fn pooled_fixture_round_trips_through_the_kernel() {
    let geometry = PoolGeometry::non_overlapping([2, 3]);
    let source_dims = [3, 6, 9, 5];
    let input = seeded_values(21, source_dims.iter().product());
    let fixture = max_pool2d_nhwc_with_indices(&input, source_dims, geometry);

    let mut kernel =
        MaxUnpool::new(&unpool_node(fixture.pooled_dims, geometry, 0, None), None).unwrap();
    let x = Tensor::from_f32(fixture.pooled_dims, fixture.values.clone()).unwrap();
    let indices = Tensor::from_i64(fixture.pooled_dims, fixture.nchw_indices.clone()).unwrap();
    let expected = fixture.expected_unpooled(source_dims);

    for pool in [
        ThreadPool::sequential(),
        ThreadPool::with_threads(3).with_min_block_cost(1.0),
    ] {
        let out = run_kernel(&mut kernel, &x, &indices, None, &pool).unwrap();
        assert_eq!(out.dims(), &source_dims);
        assert_eq!(out.data(), expected.as_slice());
    }
}

#[test]
fn overlapping_windows_match_naive_scatter() {
    let geometry = PoolGeometry {
        kernel: [3, 3],
        stride: [2, 2],
        pads: [1, 1, 1, 1],
    };
    let source_dims = [1, 7, 7, 2];
    let input = seeded_values(5, source_dims.iter().product());
    let fixture = max_pool2d_nhwc_with_indices(&input, source_dims, geometry);
    assert_eq!(fixture.pooled_dims, [1, 4, 4, 2]);

    let mut kernel =
        MaxUnpool::new(&unpool_node(fixture.pooled_dims, geometry, 0, None), None).unwrap();
    let x = Tensor::from_f32(fixture.pooled_dims, fixture.values.clone()).unwrap();
    let indices = Tensor::from_i64(fixture.pooled_dims, fixture.nchw_indices.clone()).unwrap();
    let out = run_kernel(
        &mut kernel,
        &x,
        &indices,
        None,
        &ThreadPool::with_threads(4).with_min_block_cost(1.0),
    )
    .unwrap();
    assert_eq!(out.data(), fixture.expected_unpooled(source_dims).as_slice());
}

#[test]
fn explicit_output_shape_is_honored_at_run_time() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let node = unpool_node([1, 2, 2, 1], geometry, 0, Some([1, 5, 5, 1]));
    let mut kernel = MaxUnpool::new(&node, None).unwrap();
    assert_eq!(kernel.output_dims(1), [1, 5, 5, 1]);

    let x = Tensor::from_f32([1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let indices = Tensor::from_i64([1, 2, 2, 1], vec![0, 3, 15, 24]).unwrap();
    let shape = Tensor::from_i64([4], vec![1, 1, 5, 5]).unwrap();
    let pool = ThreadPool::sequential();
    let out = run_kernel(&mut kernel, &x, &indices, Some(&shape), &pool).unwrap();
    assert_eq!(out.dims(), &[1, 5, 5, 1]);
    assert_eq!(out.data()[0], 1.0);
    assert_eq!(out.data()[3], 2.0);
    assert_eq!(out.data()[15], 3.0);
    assert_eq!(out.data()[24], 4.0);

    let wrong = Tensor::from_i64([4], vec![1, 1, 4, 4]).unwrap();
    let err = run_kernel(&mut kernel, &x, &indices, Some(&wrong), &pool).unwrap_err();
    assert!(matches!(err, UnpoolError::ShapeMismatch { .. }));
    assert!(err.is_recoverable());
    assert!(run_kernel(&mut kernel, &x, &indices, Some(&shape), &pool).is_ok());
}

#[test]
fn declared_output_shape_must_be_supplied_at_run_time() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let node = unpool_node([1, 2, 2, 1], geometry, 0, Some([1, 4, 4, 1]));
    let mut kernel = MaxUnpool::new(&node, None).unwrap();
    let x = Tensor::from_f32([1, 2, 2, 1], vec![1.0; 4]).unwrap();
    let indices = Tensor::from_i64([1, 2, 2, 1], vec![0, 2, 8, 10]).unwrap();
    let err = run_kernel(&mut kernel, &x, &indices, None, &ThreadPool::sequential()).unwrap_err();
    assert!(matches!(err, UnpoolError::InvalidInput { index: 2, .. }));
    assert!(err.is_recoverable());
}

#[test]
fn out_of_range_index_fails_the_invocation() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let mut kernel = MaxUnpool::new(&unpool_node([1, 2, 2, 1], geometry, 0, None), None).unwrap();
    let x = Tensor::from_f32([1, 2, 2, 1], vec![1.0; 4]).unwrap();
    let indices = Tensor::from_i64([1, 2, 2, 1], vec![0, 2, 16, 10]).unwrap();
    let err = run_kernel(&mut kernel, &x, &indices, None, &ThreadPool::sequential()).unwrap_err();
    assert_eq!(
        err,
        UnpoolError::IndexOutOfBounds {
            position: 2,
            value: 16,
            limit: 16
        }
    );
    assert!(err.is_recoverable());
}

#[test]
fn mismatched_input_extent_is_an_invalid_input() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let mut kernel = MaxUnpool::new(&unpool_node([1, 2, 2, 1], geometry, 0, None), None).unwrap();
    let x = Tensor::from_f32([1, 2, 3, 1], vec![1.0; 6]).unwrap();
    let indices = Tensor::from_i64([1, 2, 3, 1], vec![0; 6]).unwrap();
    let err = run_kernel(&mut kernel, &x, &indices, None, &ThreadPool::sequential()).unwrap_err();
    assert!(matches!(err, UnpoolError::InvalidInput { index: 0, .. }));
}

#[test]
fn batch_is_taken_from_the_run_time_input() {
    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let mut kernel = MaxUnpool::new(&unpool_node([1, 1, 1, 2], geometry, 0, None), None).unwrap();
    let x = Tensor::from_f32([3, 1, 1, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    // Offsets are channel-first over the [3, 2, 2, 2] output.
    let indices = Tensor::from_i64([3, 1, 1, 2], vec![0, 7, 9, 14, 19, 20]).unwrap();
    let out = run_kernel(&mut kernel, &x, &indices, None, &ThreadPool::sequential()).unwrap();
    assert_eq!(out.dims(), &[3, 2, 2, 2]);
    assert_eq!(
        out.data(),
        &[
            1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, //
            0.0, 0.0, 3.0, 0.0, 0.0, 4.0, 0.0, 0.0, //
            0.0, 6.0, 0.0, 0.0, 0.0, 0.0, 5.0, 0.0,
        ]
    );
}
