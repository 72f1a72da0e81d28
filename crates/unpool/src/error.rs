//! Error taxonomy shared by construction and invocation of the unpool kernel.

use thiserror::Error;

use crate::engine::EngineStatus;

/// Which accelerated-engine step reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStage {
    Create,
    Configure,
    Run,
}

impl EngineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineStage::Create => "create",
            EngineStage::Configure => "configure",
            EngineStage::Run => "run",
        }
    }
}

/// Coarse classification used by callers to decide whether an instance stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedConfiguration,
    ShapeMismatch,
    EngineInvocation,
    Allocation,
    InvalidInput,
}

/// Errors surfaced by [`crate::MaxUnpool`] and the helpers it is built from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpoolError {
    #[error("{op}: required attribute '{name}' is missing")]
    MissingAttribute { op: &'static str, name: &'static str },

    #[error("{op}: invalid attribute '{name}': {reason}")]
    InvalidAttribute {
        op: &'static str,
        name: &'static str,
        reason: String,
    },

    #[error("unsupported configuration: {reason}")]
    UnsupportedConfiguration { reason: String },

    #[error("shape mismatch ({context}): expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid shape: {reason}")]
    InvalidShape { reason: String },

    #[error("invalid input {index}: {reason}")]
    InvalidInput { index: usize, reason: String },

    #[error("index {value} at position {position} is outside the output of {limit} elements")]
    IndexOutOfBounds {
        position: usize,
        value: i64,
        limit: usize,
    },

    #[error("index {value} at position {position} does not fit in 32 bits")]
    IndexNarrowing { position: usize, value: i64 },

    #[error("accelerated engine '{engine}' failed to create operator: {status}")]
    EngineCreate { engine: String, status: EngineStatus },

    #[error("accelerated engine '{engine}' {} step returned {status} (code {})", .stage.as_str(), .status.code())]
    EngineInvocation {
        engine: String,
        stage: EngineStage,
        status: EngineStatus,
    },

    #[error("allocation of {requested_bytes} bytes for {what} failed")]
    Allocation {
        what: &'static str,
        requested_bytes: usize,
    },
}

impl UnpoolError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        UnpoolError::UnsupportedConfiguration {
            reason: reason.into(),
        }
    }

    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        UnpoolError::InvalidShape {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(index: usize, reason: impl Into<String>) -> Self {
        UnpoolError::InvalidInput {
            index,
            reason: reason.into(),
        }
    }

    pub fn invalid_attribute(
        op: &'static str,
        name: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        UnpoolError::InvalidAttribute {
            op,
            name,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UnpoolError::MissingAttribute { .. }
            | UnpoolError::InvalidAttribute { .. }
            | UnpoolError::UnsupportedConfiguration { .. }
            | UnpoolError::InvalidShape { .. }
            | UnpoolError::EngineCreate { .. } => ErrorKind::UnsupportedConfiguration,
            UnpoolError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            UnpoolError::EngineInvocation { .. } => ErrorKind::EngineInvocation,
            UnpoolError::Allocation { .. } => ErrorKind::Allocation,
            UnpoolError::InvalidInput { .. }
            | UnpoolError::IndexOutOfBounds { .. }
            | UnpoolError::IndexNarrowing { .. } => ErrorKind::InvalidInput,
        }
    }

    /// True when the kernel instance stays valid after this error.
    ///
    /// Shape mismatches are only recoverable when they were detected against a run-time input.
    pub fn is_recoverable(&self) -> bool {
        match self {
            UnpoolError::ShapeMismatch { context, .. } => *context == RUNTIME_OUTPUT_SHAPE,
            other => matches!(
                other.kind(),
                ErrorKind::EngineInvocation | ErrorKind::Allocation | ErrorKind::InvalidInput
            ),
        }
    }
}

/// Context tag used for mismatches between a run-time `output_shape` input and the static shape.
pub(crate) const RUNTIME_OUTPUT_SHAPE: &str = "runtime output_shape";

/// Convenience alias for results returned by kernel routines.
pub type Result<T> = std::result::Result<T, UnpoolError>;
