//! Pure building blocks of the unpool kernel: attributes, shape algebra, index-space
//! conversion, and the generic scatter.

pub mod attributes;
pub mod index;
pub mod scatter;
pub mod shape_inference;

pub use attributes::{is_padding_type_supported, AutoPad, PoolAttributes};
pub use index::{
    decode_flat_index, encode_coord, narrow_indices, nchw_dims_to_nhwc, nhwc_dims_to_nchw,
    remap_flat_index, Coord4, Dims4, Layout,
};
pub use scatter::scatter_nchw_indices;
pub use shape_inference::{
    explicit_output_shape_nhwc, infer_unpool_output_shape, pooled_output_size,
    reconcile_runtime_output_shape, unpooled_extent,
};
