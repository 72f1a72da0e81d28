//! The MaxUnpool kernel and its registrations.

mod max_unpool;
pub mod registration;

pub use max_unpool::{ExecutionPath, IndexOrigin, MaxUnpool, OP_TYPE};
pub use registration::{find_kernel_def, KernelDef, MAX_UNPOOL_KERNELS, NHWC_DOMAIN};
