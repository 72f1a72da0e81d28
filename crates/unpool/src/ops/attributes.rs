//! Pooling attributes (kernel, strides, pads, auto_pad) shared by pooling-family kernels.

use crate::error::{Result, UnpoolError};
use crate::node::AttributeMap;

/// Padding policy from the `auto_pad` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoPad {
    /// Explicit `pads` attribute.
    NotSet,
    SameUpper,
    SameLower,
    Valid,
}

impl AutoPad {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "NOTSET" => Some(AutoPad::NotSet),
            "SAME_UPPER" => Some(AutoPad::SameUpper),
            "SAME_LOWER" => Some(AutoPad::SameLower),
            "VALID" => Some(AutoPad::Valid),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AutoPad::NotSet => "NOTSET",
            AutoPad::SameUpper => "SAME_UPPER",
            AutoPad::SameLower => "SAME_LOWER",
            AutoPad::Valid => "VALID",
        }
    }
}

/// Padding modes the NHWC unpool kernels can honor.
pub fn is_padding_type_supported(auto_pad: AutoPad) -> bool {
    matches!(
        auto_pad,
        AutoPad::NotSet | AutoPad::Valid | AutoPad::SameUpper
    )
}

/// Number of spatial axes supported by the 2-D kernels.
pub const SPATIAL_RANK: usize = 2;

/// Validated, immutable pooling attributes.
///
/// `pads` holds all leading pads followed by all trailing pads (`[top, left, bottom, right]`
/// for 2-D). After construction the pads are resolved: `VALID` and `SAME_UPPER` have already
/// been turned into explicit values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolAttributes {
    kernel_shape: Vec<usize>,
    strides: Vec<usize>,
    pads: Vec<usize>,
    auto_pad: AutoPad,
}

impl PoolAttributes {
    /// Builds attributes from explicit values, applying the same validation as [`from_node`].
    ///
    /// [`from_node`]: PoolAttributes::from_node
    pub fn new(
        kernel_shape: Vec<usize>,
        strides: Vec<usize>,
        pads: Vec<usize>,
        auto_pad: AutoPad,
    ) -> Result<Self> {
        Self::validated("Pool", kernel_shape, strides, pads, auto_pad)
    }

    /// Parses and validates attributes for `op` from a node attribute map.
    ///
    /// `kernel_shape` is required; `strides` default to ones, `pads` to zeros, and `auto_pad`
    /// to `NOTSET`. MaxUnpool opsets before 11 have no explicit output shape, which does not
    /// change attribute parsing, so `since_version` is only checked for a sane lower bound.
    pub fn from_node(op: &'static str, since_version: u32, attrs: &AttributeMap) -> Result<Self> {
        if since_version == 0 {
            return Err(UnpoolError::invalid_attribute(
                op,
                "since_version",
                "opset version must be positive",
            ));
        }

        let kernel = attrs
            .get_ints(op, "kernel_shape")?
            .ok_or(UnpoolError::MissingAttribute {
                op,
                name: "kernel_shape",
            })?;
        let kernel_shape = to_usize_vec(op, "kernel_shape", kernel)?;
        let rank = kernel_shape.len();

        let strides = match attrs.get_ints(op, "strides")? {
            Some(values) => to_usize_vec(op, "strides", values)?,
            None => vec![1; rank],
        };
        let pads = match attrs.get_ints(op, "pads")? {
            Some(values) => to_usize_vec(op, "pads", values)?,
            None => vec![0; rank * 2],
        };
        let auto_pad_str = attrs.get_string_or(op, "auto_pad", "NOTSET")?;
        let auto_pad = AutoPad::parse(auto_pad_str).ok_or_else(|| {
            UnpoolError::invalid_attribute(op, "auto_pad", format!("unknown mode '{auto_pad_str}'"))
        })?;

        Self::validated(op, kernel_shape, strides, pads, auto_pad)
    }

    fn validated(
        op: &'static str,
        kernel_shape: Vec<usize>,
        strides: Vec<usize>,
        mut pads: Vec<usize>,
        auto_pad: AutoPad,
    ) -> Result<Self> {
        let rank = kernel_shape.len();
        if rank != SPATIAL_RANK {
            return Err(UnpoolError::invalid_attribute(
                op,
                "kernel_shape",
                format!("expected {SPATIAL_RANK} spatial axes, got {rank}"),
            ));
        }
        if strides.len() != rank {
            return Err(UnpoolError::invalid_attribute(
                op,
                "strides",
                format!("length {} does not match kernel rank {rank}", strides.len()),
            ));
        }
        if pads.len() != rank * 2 {
            return Err(UnpoolError::invalid_attribute(
                op,
                "pads",
                format!("length {} must be twice the kernel rank {rank}", pads.len()),
            ));
        }
        if kernel_shape.iter().any(|&k| k == 0) {
            return Err(UnpoolError::invalid_attribute(
                op,
                "kernel_shape",
                "kernel extents must be positive",
            ));
        }
        if strides.iter().any(|&s| s == 0) {
            return Err(UnpoolError::invalid_attribute(
                op,
                "strides",
                "strides must be positive",
            ));
        }

        match auto_pad {
            AutoPad::NotSet => {}
            AutoPad::Valid => pads.iter_mut().for_each(|p| *p = 0),
            AutoPad::SameUpper | AutoPad::SameLower => {
                for axis in 0..rank {
                    let total = kernel_shape[axis].saturating_sub(strides[axis]);
                    let small = total / 2;
                    let large = total - small;
                    let (begin, end) = if auto_pad == AutoPad::SameUpper {
                        (small, large)
                    } else {
                        (large, small)
                    };
                    pads[axis] = begin;
                    pads[axis + rank] = end;
                }
            }
        }

        for axis in 0..rank {
            let kernel = kernel_shape[axis];
            if pads[axis] >= kernel || pads[axis + rank] >= kernel {
                return Err(UnpoolError::invalid_attribute(
                    op,
                    "pads",
                    format!("padding on axis {axis} must be smaller than the kernel extent {kernel}"),
                ));
            }
        }

        Ok(PoolAttributes {
            kernel_shape,
            strides,
            pads,
            auto_pad,
        })
    }

    pub fn kernel_shape(&self) -> &[usize] {
        &self.kernel_shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn pads(&self) -> &[usize] {
        &self.pads
    }

    pub fn auto_pad(&self) -> AutoPad {
        self.auto_pad
    }

    pub fn rank(&self) -> usize {
        self.kernel_shape.len()
    }

    pub fn pads_begin(&self, axis: usize) -> usize {
        self.pads[axis]
    }

    pub fn pads_end(&self, axis: usize) -> usize {
        self.pads[axis + self.rank()]
    }

    pub fn total_pad(&self, axis: usize) -> usize {
        self.pads_begin(axis) + self.pads_end(axis)
    }

    pub fn has_padding(&self) -> bool {
        self.pads.iter().any(|&p| p != 0)
    }

    /// True when every stride equals its kernel extent (non-overlapping windows).
    pub fn is_stride_equal_to_kernel(&self) -> bool {
        self.kernel_shape == self.strides
    }

    /// Copy of these attributes with replaced padding. Skips the pad-vs-kernel check so
    /// callers can express crops derived from an explicit output shape.
    pub fn with_pads(&self, pads_begin: &[usize], pads_end: &[usize]) -> Self {
        let mut pads = Vec::with_capacity(self.rank() * 2);
        pads.extend_from_slice(pads_begin);
        pads.extend_from_slice(pads_end);
        PoolAttributes {
            kernel_shape: self.kernel_shape.clone(),
            strides: self.strides.clone(),
            pads,
            auto_pad: AutoPad::NotSet,
        }
    }
}

fn to_usize_vec(op: &'static str, name: &'static str, values: &[i64]) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&value| {
            usize::try_from(value).map_err(|_| {
                UnpoolError::invalid_attribute(op, name, format!("negative value {value}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_upper_puts_extra_padding_at_the_end() {
        let attrs = PoolAttributes::new(vec![3, 4], vec![1, 1], vec![0; 4], AutoPad::SameUpper)
            .unwrap();
        assert_eq!(attrs.pads(), &[1, 1, 1, 2]);
    }

    #[test]
    fn valid_clears_explicit_pads() {
        let attrs =
            PoolAttributes::new(vec![3, 3], vec![2, 2], vec![1, 1, 1, 1], AutoPad::Valid).unwrap();
        assert!(!attrs.has_padding());
    }
}
