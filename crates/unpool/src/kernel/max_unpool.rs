//! MaxUnpool on channel-last tensors with two execution strategies.
//!
//! The `mode` attribute says who produced the indices. `mode = 0` means an external pooling
//! op produced channel-first flat indices, which the generic scatter consumes. `mode = 1`
//! means the accelerated engine's own pooling produced window-local indices, so the work is
//! delegated to an engine operator created once at construction.

use std::sync::Arc;

use tracing::{debug, trace};

use super::registration::{find_kernel_def, NHWC_DOMAIN};
use crate::context::KernelContext;
use crate::engine::{
    registry, AcceleratedEngine, EngineOperator, OperatorState, Unpooling2dDescriptor,
};
use crate::env;
use crate::error::{Result, UnpoolError};
use crate::node::{NodeDescriptor, ValueInfo};
use crate::ops::{
    explicit_output_shape_nhwc, infer_unpool_output_shape, is_padding_type_supported,
    narrow_indices, reconcile_runtime_output_shape, scatter_nchw_indices, Dims4,
    PoolAttributes,
};
use crate::tensor::DType;

pub const OP_TYPE: &str = "MaxUnpool";

/// Producer of the index tensor, read from the `mode` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOrigin {
    /// Channel-first flat offsets from a generic pooling op.
    External,
    /// Window-local offsets from the accelerated engine's pooling op.
    Engine,
}

impl IndexOrigin {
    pub fn from_node(node: &NodeDescriptor) -> Result<Self> {
        match node.attributes.get_int_or(OP_TYPE, "mode", 0)? {
            0 => Ok(IndexOrigin::External),
            1 => Ok(IndexOrigin::Engine),
            other => Err(UnpoolError::invalid_attribute(
                OP_TYPE,
                "mode",
                format!("expected 0 or 1, got {other}"),
            )),
        }
    }
}

/// Which strategy a constructed kernel dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionPath {
    Generic,
    Accelerated,
}

#[derive(Debug)]
enum UnpoolStrategy {
    Generic,
    Accelerated(EngineOperator),
}

/// MaxUnpool kernel instance bound to one graph node.
///
/// `compute` takes `&mut self`: callers must not run two invocations of the same instance
/// at once, and the borrow checker enforces it.
#[derive(Debug)]
pub struct MaxUnpool {
    attrs: PoolAttributes,
    num_inputs: usize,
    input_hwc: [usize; 3],
    /// NHWC output dims; the batch slot is only a placeholder until `compute`.
    output_dims: [usize; 4],
    strategy: UnpoolStrategy,
}

impl MaxUnpool {
    /// Builds the kernel for `node`. `engine` is required when `mode = 1`.
    pub fn new(node: &NodeDescriptor, engine: Option<Arc<dyn AcceleratedEngine>>) -> Result<Self> {
        let num_inputs = node.inputs.len();
        if !(2..=3).contains(&num_inputs) {
            return Err(UnpoolError::unsupported(format!(
                "{OP_TYPE} takes 2 or 3 inputs, node has {num_inputs}"
            )));
        }

        let [h, w, c] = static_hwc(&node.inputs[0])?;
        let attrs = PoolAttributes::from_node(OP_TYPE, node.since_version, &node.attributes)?;
        if !is_padding_type_supported(attrs.auto_pad()) {
            return Err(UnpoolError::unsupported(format!(
                "auto_pad {} is not supported",
                attrs.auto_pad().as_str()
            )));
        }
        let origin = IndexOrigin::from_node(node)?;

        let batch_hint = node.inputs[0].static_dim(0).unwrap_or(1);
        let inferred = infer_unpool_output_shape(&attrs, [batch_hint, h, w, c])?;
        let mut output_dims = inferred;

        if num_inputs == 3 {
            match node.constant_input(2) {
                Some(shape) => {
                    if shape.dims.as_slice() != [4] {
                        return Err(UnpoolError::unsupported(format!(
                            "output_shape must have dims [4], got {:?}",
                            shape.dims
                        )));
                    }
                    let explicit = explicit_output_shape_nhwc(&shape.data)?;
                    if explicit[3] != c {
                        return Err(UnpoolError::ShapeMismatch {
                            context: "output_shape channels",
                            expected: vec![c],
                            actual: vec![explicit[3]],
                        });
                    }
                    output_dims = [batch_hint, explicit[1], explicit[2], explicit[3]];
                }
                None if origin == IndexOrigin::Engine => {
                    return Err(UnpoolError::unsupported(
                        "accelerated path needs output_shape as a constant initializer",
                    ));
                }
                None => {}
            }
        }

        check_graph_output_shape(node, &output_dims)?;

        let strategy = match origin {
            IndexOrigin::External => UnpoolStrategy::Generic,
            IndexOrigin::Engine => {
                let engine = engine.ok_or_else(|| {
                    UnpoolError::unsupported("indices come from the accelerated engine but none is available")
                })?;
                if !attrs.is_stride_equal_to_kernel() {
                    return Err(UnpoolError::unsupported(format!(
                        "accelerated unpooling needs strides equal to the kernel, got strides {:?} and kernel {:?}",
                        attrs.strides(),
                        attrs.kernel_shape()
                    )));
                }
                let engine_attrs = if output_dims[1..3] == inferred[1..3] {
                    attrs.clone()
                } else {
                    padding_for_explicit_output(&attrs, [h, w], [output_dims[1], output_dims[2]])?
                };
                let desc = unpooling_descriptor(&engine_attrs, c)?;
                UnpoolStrategy::Accelerated(EngineOperator::create_unpooling2d(engine, &desc)?)
            }
        };

        debug!(
            target: "unpool::kernel",
            path = ?path_of(&strategy),
            inputs = num_inputs,
            output_hwc = ?&output_dims[1..],
            "constructed {OP_TYPE} kernel"
        );

        Ok(Self {
            attrs,
            num_inputs,
            input_hwc: [h, w, c],
            output_dims,
            strategy,
        })
    }

    /// Builds the kernel, resolving the accelerated engine from the registry when needed.
    ///
    /// The engine name comes from `UNPOOL_ENGINE` and defaults to `"reference"`.
    pub fn with_default_engine(node: &NodeDescriptor) -> Result<Self> {
        let engine = match IndexOrigin::from_node(node)? {
            IndexOrigin::External => None,
            IndexOrigin::Engine => {
                let name = env::engine_name();
                Some(registry::create_engine(name).ok_or_else(|| {
                    UnpoolError::unsupported(format!("no accelerated engine registered as '{name}'"))
                })?)
            }
        };
        Self::new(node, engine)
    }

    /// Whether a kernel could be built for `node`, without building it.
    pub fn is_node_supported(node: &NodeDescriptor) -> bool {
        match Self::check_node_support(node) {
            Ok(()) => true,
            Err(reason) => {
                trace!(target: "unpool::kernel", %reason, "node not supported");
                false
            }
        }
    }

    /// Same checks as [`is_node_supported`](Self::is_node_supported), reporting the first
    /// reason a node is rejected.
    pub fn check_node_support(node: &NodeDescriptor) -> Result<()> {
        if node.op_type != OP_TYPE {
            return Err(UnpoolError::unsupported(format!(
                "op type {} is not {OP_TYPE}",
                node.op_type
            )));
        }
        if find_kernel_def(OP_TYPE, NHWC_DOMAIN, node.since_version).is_none() {
            return Err(UnpoolError::unsupported(format!(
                "no kernel registered for opset {}",
                node.since_version
            )));
        }
        let num_inputs = node.inputs.len();
        if !(2..=3).contains(&num_inputs) {
            return Err(UnpoolError::unsupported(format!(
                "expected 2 or 3 inputs, got {num_inputs}"
            )));
        }
        if num_inputs == 3 {
            let shape = node.constant_input(2).ok_or_else(|| {
                UnpoolError::unsupported("output_shape must be a constant initializer")
            })?;
            if shape.dims.as_slice() != [4] || shape.data.len() != 4 {
                return Err(UnpoolError::unsupported(format!(
                    "output_shape must have dims [4], got {:?}",
                    shape.dims
                )));
            }
        }
        static_hwc(&node.inputs[0])?;
        let attrs = PoolAttributes::from_node(OP_TYPE, node.since_version, &node.attributes)?;
        if !is_padding_type_supported(attrs.auto_pad()) {
            return Err(UnpoolError::unsupported(format!(
                "auto_pad {} is not supported",
                attrs.auto_pad().as_str()
            )));
        }
        Ok(())
    }

    pub fn attributes(&self) -> &PoolAttributes {
        &self.attrs
    }

    /// Output dims in NHWC order with `batch` substituted.
    pub fn output_dims(&self, batch: usize) -> [usize; 4] {
        let mut dims = self.output_dims;
        dims[0] = batch;
        dims
    }

    pub fn execution_path(&self) -> ExecutionPath {
        path_of(&self.strategy)
    }

    /// Lifecycle state of the engine operator, `None` on the generic path.
    pub fn operator_state(&self) -> Option<OperatorState> {
        match &self.strategy {
            UnpoolStrategy::Generic => None,
            UnpoolStrategy::Accelerated(op) => Some(op.state()),
        }
    }

    /// Runs one invocation: reads `X`, `I` (and `output_shape` on the generic 3-input path),
    /// allocates output 0, and dispatches to the strategy chosen at construction.
    pub fn compute(&mut self, ctx: &mut KernelContext<'_>) -> Result<()> {
        let x = ctx.input(0)?;
        let x_data = x.as_f32(0)?;
        let x_dims = x.dims();
        if x_dims.len() != 4 || x_dims[1..] != self.input_hwc {
            return Err(UnpoolError::invalid_input(
                0,
                format!(
                    "expected NHWC dims [N, {}, {}, {}], got {x_dims:?}",
                    self.input_hwc[0], self.input_hwc[1], self.input_hwc[2]
                ),
            ));
        }
        let indices = ctx.input(1)?.as_i64(1)?;
        if indices.len() != x_data.len() {
            return Err(UnpoolError::invalid_input(
                1,
                format!(
                    "holds {} indices for {} input elements",
                    indices.len(),
                    x_data.len()
                ),
            ));
        }

        let batch = x_dims[0];
        let [h, w, c] = self.input_hwc;
        let pool = ctx.thread_pool();
        let mut output_dims = self.output_dims(batch);

        trace!(
            target: "unpool::kernel",
            path = ?self.execution_path(),
            batch,
            "{OP_TYPE} compute"
        );

        match &mut self.strategy {
            UnpoolStrategy::Generic => {
                if self.num_inputs == 3 {
                    if ctx.input_count() < 3 {
                        return Err(UnpoolError::invalid_input(
                            2,
                            "output_shape is declared on the node but was not supplied",
                        ));
                    }
                    let explicit = ctx.input(2)?.as_i64(2)?;
                    output_dims = reconcile_runtime_output_shape(output_dims, explicit, batch)?;
                }
                let out = ctx.allocate_output(0, &output_dims)?;
                scatter_nchw_indices(
                    x_data,
                    indices,
                    Dims4::from_nhwc([batch, h, w, c]),
                    Dims4::from_nhwc(output_dims),
                    out,
                    pool,
                )
            }
            UnpoolStrategy::Accelerated(op) => {
                let mut narrowed = ctx.allocate_temp_u32(indices.len())?;
                narrow_indices(indices, &mut narrowed)?;
                op.configure(batch, h, w, pool)?;
                let out = ctx.allocate_output(0, &output_dims)?;
                op.run(x_data, &narrowed, out, pool)
            }
        }
    }
}

fn path_of(strategy: &UnpoolStrategy) -> ExecutionPath {
    match strategy {
        UnpoolStrategy::Generic => ExecutionPath::Generic,
        UnpoolStrategy::Accelerated(_) => ExecutionPath::Accelerated,
    }
}

/// Reads the static `H, W, C` extents of the NHWC input.
fn static_hwc(x: &ValueInfo) -> Result<[usize; 3]> {
    if x.dtype != Some(DType::F32) {
        return Err(UnpoolError::unsupported(format!(
            "input {} must be f32, got {:?}",
            x.name, x.dtype
        )));
    }
    if x.rank() != Some(4) {
        return Err(UnpoolError::unsupported(format!(
            "input {} must be rank 4 NHWC, got rank {:?}",
            x.name,
            x.rank()
        )));
    }
    match (x.static_dim(1), x.static_dim(2), x.static_dim(3)) {
        (Some(h), Some(w), Some(c)) => Ok([h, w, c]),
        _ => Err(UnpoolError::unsupported(format!(
            "input {} needs static H, W and C to build the kernel",
            x.name
        ))),
    }
}

/// Compares spatial/channel dims with the graph's own shape inference for output 0.
fn check_graph_output_shape(node: &NodeDescriptor, output_dims: &[usize; 4]) -> Result<()> {
    let Some(shape) = node.outputs.first().and_then(|value| value.shape.as_ref()) else {
        return Ok(());
    };
    let graph_dims: Vec<Option<usize>> = shape.iter().map(|dim| dim.as_static()).collect();
    let agrees = graph_dims.len() == 4
        && (1..4).all(|axis| graph_dims[axis].map_or(true, |dim| dim == output_dims[axis]));
    if agrees {
        return Ok(());
    }
    Err(UnpoolError::ShapeMismatch {
        context: "graph output shape",
        expected: graph_dims.iter().map(|dim| dim.unwrap_or(0)).collect(),
        actual: output_dims.to_vec(),
    })
}

/// Re-derives trailing padding so the engine produces `output_hw` for an `input_hw` input.
///
/// Leading pads are kept; everything the explicit shape crops beyond them goes to the
/// trailing side.
fn padding_for_explicit_output(
    attrs: &PoolAttributes,
    input_hw: [usize; 2],
    output_hw: [usize; 2],
) -> Result<PoolAttributes> {
    let mut begin = [0usize; 2];
    let mut end = [0usize; 2];
    for axis in 0..2 {
        let grown = (input_hw[axis] - 1) * attrs.strides()[axis] + attrs.kernel_shape()[axis];
        let total = grown.checked_sub(output_hw[axis]).ok_or_else(|| {
            UnpoolError::unsupported(format!(
                "output_shape extent {} on axis {axis} exceeds the unpooled extent {grown}",
                output_hw[axis]
            ))
        })?;
        begin[axis] = attrs.pads_begin(axis);
        end[axis] = total.checked_sub(begin[axis]).ok_or_else(|| {
            UnpoolError::unsupported(format!(
                "output_shape extent {} on axis {axis} is incompatible with leading padding {}",
                output_hw[axis],
                begin[axis]
            ))
        })?;
    }
    Ok(attrs.with_pads(&begin, &end))
}

fn unpooling_descriptor(attrs: &PoolAttributes, channels: usize) -> Result<Unpooling2dDescriptor> {
    let narrow = |value: usize, what: &str| {
        u32::try_from(value)
            .map_err(|_| UnpoolError::unsupported(format!("{what} {value} does not fit in 32 bits")))
    };
    Ok(Unpooling2dDescriptor {
        padding_top: narrow(attrs.pads_begin(0), "top padding")?,
        padding_right: narrow(attrs.pads_end(1), "right padding")?,
        padding_bottom: narrow(attrs.pads_end(0), "bottom padding")?,
        padding_left: narrow(attrs.pads_begin(1), "left padding")?,
        pooling_height: narrow(attrs.kernel_shape()[0], "pooling height")?,
        pooling_width: narrow(attrs.kernel_shape()[1], "pooling width")?,
        channels,
        input_pixel_stride: channels,
        output_pixel_stride: channels,
        flags: 0,
    })
}
