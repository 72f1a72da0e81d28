//! Host-side max pooling with indices and a naive unpool, used as ground truth.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use unpool::node::{AttributeMap, ConstTensor, NodeDescriptor, ValueInfo};
use unpool::ops::{nhwc_dims_to_nchw, pooled_output_size};
use unpool::{DType, HostAllocator, KernelContext, MaxUnpool, Tensor, ThreadPool, UnpoolError};

/// 2-D pooling geometry: `pads` is `[top, left, bottom, right]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolGeometry {
    pub kernel: [usize; 2],
    pub stride: [usize; 2],
    pub pads: [usize; 4],
}

impl PoolGeometry {
    pub fn non_overlapping(kernel: [usize; 2]) -> Self {
        Self {
            kernel,
            stride: kernel,
            pads: [0; 4],
        }
    }

    pub fn with_pads(mut self, pads: [usize; 4]) -> Self {
        self.pads = pads;
        self
    }

    pub fn attributes(&self) -> AttributeMap {
        AttributeMap::new()
            .with_ints("kernel_shape", to_i64(&self.kernel))
            .with_ints("strides", to_i64(&self.stride))
            .with_ints("pads", to_i64(&self.pads))
    }
}

/// Result of pooling an NHWC tensor while recording where every maximum came from.
#[derive(Debug, Clone)]
pub struct PooledFixture {
    /// NHWC dims of the tensor that was pooled.
    pub source_dims: [usize; 4],
    /// NHWC dims of the pooled tensor.
    pub pooled_dims: [usize; 4],
    /// Pooled values, NHWC.
    pub values: Vec<f32>,
    /// Channel-first flat offsets into the source, stored channel-first over the pooled dims.
    pub nchw_indices: Vec<i64>,
    /// Offsets inside each window (`ky * kernel_w + kx`), stored NHWC like `values`.
    pub window_indices: Vec<i64>,
    /// Source coordinates `(n, y, x, c)` of each maximum, NHWC order.
    argmax: Vec<[usize; 4]>,
}

impl PooledFixture {
    /// Naive unpool into `dims` (NHWC): zeros plus every maximum put back where it came from.
    /// Later pooled positions win when windows overlap.
    pub fn expected_unpooled(&self, dims: [usize; 4]) -> Vec<f32> {
        let [_, h, w, c] = dims;
        let mut out = vec![0.0f32; dims.iter().product()];
        for (value, &[n, y, x, ch]) in self.values.iter().zip(&self.argmax) {
            out[((n * h + y) * w + x) * c + ch] = *value;
        }
        out
    }
}

/// Max-pools an NHWC tensor, returning both index encodings.
pub fn max_pool2d_nhwc_with_indices(
    input: &[f32],
    dims: [usize; 4],
    geometry: PoolGeometry,
) -> PooledFixture {
    let [n, h, w, c] = dims;
    assert_eq!(input.len(), dims.iter().product::<usize>());
    let [kh, kw] = geometry.kernel;
    let [sh, sw] = geometry.stride;
    let [pt, pl, pb, pr] = geometry.pads;
    let ph = pooled_output_size(h, kh, sh, pt, pb).expect("pooling window larger than input");
    let pw = pooled_output_size(w, kw, sw, pl, pr).expect("pooling window larger than input");
    let pooled_dims = [n, ph, pw, c];
    let pooled_len = n * ph * pw * c;

    let mut values = Vec::with_capacity(pooled_len);
    let mut window_indices = Vec::with_capacity(pooled_len);
    let mut argmax = Vec::with_capacity(pooled_len);
    let mut nchw_indices = vec![0i64; pooled_len];

    for b in 0..n {
        for py in 0..ph {
            for px in 0..pw {
                for ch in 0..c {
                    let mut best: Option<(f32, usize, usize, usize, usize)> = None;
                    for ky in 0..kh {
                        for kx in 0..kw {
                            let Some(y) = (py * sh + ky).checked_sub(pt).filter(|&y| y < h) else {
                                continue;
                            };
                            let Some(x) = (px * sw + kx).checked_sub(pl).filter(|&x| x < w) else {
                                continue;
                            };
                            let value = input[((b * h + y) * w + x) * c + ch];
                            if best.map_or(true, |(current, ..)| value > current) {
                                best = Some((value, y, x, ky, kx));
                            }
                        }
                    }
                    let (value, y, x, ky, kx) = best.expect("window covers no input element");
                    values.push(value);
                    window_indices.push((ky * kw + kx) as i64);
                    argmax.push([b, y, x, ch]);
                    let slot = ((b * c + ch) * ph + py) * pw + px;
                    nchw_indices[slot] = (((b * c + ch) * h + y) * w + x) as i64;
                }
            }
        }
    }

    PooledFixture {
        source_dims: dims,
        pooled_dims,
        values,
        nchw_indices,
        window_indices,
        argmax,
    }
}

/// Uniform values in `[-1, 1)` from a fixed seed.
pub fn seeded_values(seed: u64, len: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

/// MaxUnpool node over a static NHWC input, in the channel-last internal domain.
///
/// `output_shape`, when given, is NHWC and becomes a constant third input stored NCHW.
pub fn unpool_node(
    pooled_dims: [usize; 4],
    geometry: PoolGeometry,
    mode: i64,
    output_shape: Option<[usize; 4]>,
) -> NodeDescriptor {
    let mut node = NodeDescriptor::new(
        unpool::kernel::OP_TYPE,
        unpool::kernel::NHWC_DOMAIN,
        11,
    )
    .with_input(ValueInfo::with_static_shape("X", DType::F32, &pooled_dims))
    .with_input(ValueInfo::with_static_shape("I", DType::I64, &pooled_dims))
    .with_attributes(geometry.attributes().with_int("mode", mode));
    if let Some(shape) = output_shape {
        node = node
            .with_input(ValueInfo::with_static_shape("output_shape", DType::I64, &[4]))
            .with_initializer(
                "output_shape",
                ConstTensor {
                    dims: vec![4],
                    data: to_i64(&nhwc_dims_to_nchw(shape)),
                },
            );
    }
    node
}

pub fn to_i64(values: &[usize]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

/// Runs `kernel` once on host tensors and returns output 0.
pub fn run_kernel(
    kernel: &mut MaxUnpool,
    input: &Tensor,
    indices: &Tensor,
    output_shape: Option<&Tensor>,
    pool: &ThreadPool,
) -> unpool::Result<Tensor> {
    let mut views = vec![input.view(), indices.view()];
    views.extend(output_shape.map(Tensor::view));
    let mut allocator = HostAllocator::new();
    let mut ctx = KernelContext::new(&views, &mut allocator, pool);
    kernel.compute(&mut ctx)?;
    allocator
        .take_output(0)
        .ok_or_else(|| UnpoolError::invalid_shape("kernel produced no output"))
}
