use unpool::ops::{
    decode_flat_index, narrow_indices, nchw_dims_to_nhwc, nhwc_dims_to_nchw, remap_flat_index,
    Coord4, Dims4, Layout,
};
use unpool::UnpoolError;

fn dims() -> Dims4 {
    Dims4::from_nhwc([2, 3, 4, 5])
}

#[test]
fn channel_first_offset_maps_to_same_coordinate_channel_last() {
    let dims = dims();
    // n = 1, c = 2, h = 1, w = 3 in a [N=2, H=3, W=4, C=5] tensor.
    let nchw = 60 + 2 * 12 + 4 + 3;
    let nhwc = remap_flat_index(nchw, dims, Layout::Nchw, Layout::Nhwc).unwrap();
    assert_eq!(nhwc, 60 + (4 + 3) * 5 + 2);
    assert_eq!(
        decode_flat_index(nhwc, dims, Layout::Nhwc),
        Coord4 {
            n: 1,
            c: 2,
            h: 1,
            w: 3
        }
    );
}

#[test]
fn remap_is_a_bijection_between_layouts() {
    let dims = dims();
    let mut seen = vec![false; dims.num_elements()];
    for flat in 0..dims.num_elements() {
        let nhwc = remap_flat_index(flat as i64, dims, Layout::Nchw, Layout::Nhwc).unwrap();
        assert!(!seen[nhwc]);
        seen[nhwc] = true;
        let back = remap_flat_index(nhwc as i64, dims, Layout::Nhwc, Layout::Nchw).unwrap();
        assert_eq!(back, flat);
    }
    assert!(seen.into_iter().all(|hit| hit));
}

#[test]
fn offsets_outside_the_tensor_are_rejected() {
    let dims = dims();
    let limit = dims.num_elements() as i64;
    for bad in [-1, limit, limit + 17, i64::MAX] {
        let err = remap_flat_index(bad, dims, Layout::Nchw, Layout::Nhwc).unwrap_err();
        assert!(matches!(err, UnpoolError::IndexOutOfBounds { value, .. } if value == bad));
    }
}

#[test]
fn dim_permutations_are_inverse() {
    assert_eq!(nchw_dims_to_nhwc([1, 3, 8, 6]), [1, 8, 6, 3]);
    assert_eq!(nhwc_dims_to_nchw(nchw_dims_to_nhwc([1, 3, 8, 6])), [1, 3, 8, 6]);
}

#[test]
fn narrowing_rejects_values_outside_u32() {
    let mut out = vec![0u32; 3];
    narrow_indices(&[0, 7, u32::MAX as i64], &mut out).unwrap();
    assert_eq!(out, vec![0, 7, u32::MAX]);

    let err = narrow_indices(&[1, u32::MAX as i64 + 1, 2], &mut out).unwrap_err();
    assert_eq!(
        err,
        UnpoolError::IndexNarrowing {
            position: 1,
            value: u32::MAX as i64 + 1
        }
    );
    let err = narrow_indices(&[-3, 0, 0], &mut out).unwrap_err();
    assert!(matches!(err, UnpoolError::IndexNarrowing { position: 0, .. }));
}
