//! Index-space conversions between channel-last and channel-first tensors.
//!
//! Pooling indices are flat offsets into a channel-first (`N, C, H, W`) view while the kernel
//! stores data channel-last (`N, H, W, C`). Every place that needs to move between the two
//! orderings goes through [`remap_flat_index`] so the axis arithmetic lives in one spot.

use crate::error::{Result, UnpoolError};

/// Axis ordering of a rank-4 tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `N, H, W, C`
    Nhwc,
    /// `N, C, H, W`
    Nchw,
}

/// Logical extents of a rank-4 tensor, independent of layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dims4 {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl Dims4 {
    pub fn from_nhwc(dims: [usize; 4]) -> Self {
        Self {
            n: dims[0],
            h: dims[1],
            w: dims[2],
            c: dims[3],
        }
    }

    pub fn to_nhwc(self) -> [usize; 4] {
        [self.n, self.h, self.w, self.c]
    }

    pub fn spatial(&self) -> usize {
        self.h * self.w
    }

    pub fn per_batch(&self) -> usize {
        self.c * self.spatial()
    }

    pub fn num_elements(&self) -> usize {
        self.n * self.per_batch()
    }
}

/// Logical coordinate, independent of layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord4 {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

/// Splits a flat offset into its logical coordinate. `flat` must be in range.
pub fn decode_flat_index(flat: usize, dims: Dims4, layout: Layout) -> Coord4 {
    let per_batch = dims.per_batch();
    let n = flat / per_batch;
    let rest = flat - n * per_batch;
    match layout {
        Layout::Nchw => {
            let spatial = dims.spatial();
            let c = rest / spatial;
            let hw = rest % spatial;
            Coord4 {
                n,
                c,
                h: hw / dims.w,
                w: hw % dims.w,
            }
        }
        Layout::Nhwc => {
            let hw = rest / dims.c;
            Coord4 {
                n,
                c: rest % dims.c,
                h: hw / dims.w,
                w: hw % dims.w,
            }
        }
    }
}

/// Inverse of [`decode_flat_index`].
pub fn encode_coord(coord: Coord4, dims: Dims4, layout: Layout) -> usize {
    let hw = coord.h * dims.w + coord.w;
    match layout {
        Layout::Nchw => coord.n * dims.per_batch() + coord.c * dims.spatial() + hw,
        Layout::Nhwc => coord.n * dims.per_batch() + hw * dims.c + coord.c,
    }
}

/// Re-encodes a flat offset from one layout into another over the same logical tensor.
pub fn remap_flat_index(flat: i64, dims: Dims4, from: Layout, to: Layout) -> Result<usize> {
    let limit = dims.num_elements();
    let offset = usize::try_from(flat)
        .ok()
        .filter(|&offset| offset < limit)
        .ok_or(UnpoolError::IndexOutOfBounds {
            position: 0,
            value: flat,
            limit,
        })?;
    if from == to {
        return Ok(offset);
    }
    Ok(encode_coord(decode_flat_index(offset, dims, from), dims, to))
}

/// Permutes `[N, C, H, W]` extents into `[N, H, W, C]`.
pub fn nchw_dims_to_nhwc<T: Copy>(dims: [T; 4]) -> [T; 4] {
    [dims[0], dims[2], dims[3], dims[1]]
}

/// Permutes `[N, H, W, C]` extents into `[N, C, H, W]`.
pub fn nhwc_dims_to_nchw<T: Copy>(dims: [T; 4]) -> [T; 4] {
    [dims[0], dims[3], dims[1], dims[2]]
}

/// Narrows 64-bit indices into `out`, rejecting anything outside `0..=u32::MAX`.
pub fn narrow_indices(indices: &[i64], out: &mut [u32]) -> Result<()> {
    if indices.len() != out.len() {
        return Err(UnpoolError::invalid_shape(format!(
            "narrowing {} indices into a buffer of {}",
            indices.len(),
            out.len()
        )));
    }
    for (position, (&value, slot)) in indices.iter().zip(out.iter_mut()).enumerate() {
        *slot = u32::try_from(value).map_err(|_| UnpoolError::IndexNarrowing { position, value })?;
    }
    Ok(())
}
