//! Static kernel registrations: which opset ranges and element types the kernel serves.

use crate::tensor::DType;

/// Internal domain for nodes already rewritten to channel-last layout.
pub const NHWC_DOMAIN: &str = "com.ms.internal.nhwc";

/// One registered (op, domain, opset range) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelDef {
    pub op_type: &'static str,
    pub domain: &'static str,
    pub since_version: u32,
    /// Inclusive upper bound; `None` means open-ended.
    pub end_version: Option<u32>,
    pub type_constraints: &'static [(&'static str, DType)],
}

impl KernelDef {
    pub fn covers(&self, op_type: &str, domain: &str, version: u32) -> bool {
        self.op_type == op_type
            && self.domain == domain
            && version >= self.since_version
            && self.end_version.map_or(true, |end| version <= end)
    }

    pub fn type_constraint(&self, name: &str) -> Option<DType> {
        self.type_constraints
            .iter()
            .find(|(constraint, _)| *constraint == name)
            .map(|(_, dtype)| *dtype)
    }
}

const MAX_UNPOOL_TYPES: &[(&str, DType)] = &[("T1", DType::F32), ("T2", DType::I64)];

/// MaxUnpool registrations: opsets 9-10 and 11 onwards.
pub static MAX_UNPOOL_KERNELS: [KernelDef; 2] = [
    KernelDef {
        op_type: super::max_unpool::OP_TYPE,
        domain: NHWC_DOMAIN,
        since_version: 9,
        end_version: Some(10),
        type_constraints: MAX_UNPOOL_TYPES,
    },
    KernelDef {
        op_type: super::max_unpool::OP_TYPE,
        domain: NHWC_DOMAIN,
        since_version: 11,
        end_version: None,
        type_constraints: MAX_UNPOOL_TYPES,
    },
];

pub fn find_kernel_def(op_type: &str, domain: &str, version: u32) -> Option<&'static KernelDef> {
    MAX_UNPOOL_KERNELS
        .iter()
        .find(|def| def.covers(op_type, domain, version))
}
