use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{AcceleratedEngine, RawOperator, Unpooling2dDescriptor};
use crate::error::{EngineStage, Result, UnpoolError};
use crate::thread::ThreadPool;

/// Lifecycle position of an [`EngineOperator`]. Destroyed operators no longer exist, so there
/// is no state for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorState {
    Created,
    Configured {
        batch: usize,
        height: usize,
        width: usize,
    },
    Ran {
        batch: usize,
        height: usize,
        width: usize,
    },
}

/// Exclusive owner of one engine operator. Dropping it destroys the operator.
///
/// Not meant for concurrent use: every call that touches the engine takes `&mut self`.
pub struct EngineOperator {
    engine: Arc<dyn AcceleratedEngine>,
    raw: Option<RawOperator>,
    state: OperatorState,
}

impl EngineOperator {
    /// Creates an unpooling operator, surfacing engine rejection as a construction error.
    pub fn create_unpooling2d(
        engine: Arc<dyn AcceleratedEngine>,
        desc: &Unpooling2dDescriptor,
    ) -> Result<Self> {
        let raw = engine
            .create_unpooling2d(desc)
            .map_err(|status| UnpoolError::EngineCreate {
                engine: engine.engine_name().to_string(),
                status,
            })?;
        debug!(
            target: "unpool::engine",
            engine = engine.engine_name(),
            channels = desc.channels,
            pooling_height = desc.pooling_height,
            pooling_width = desc.pooling_width,
            "created unpooling operator"
        );
        Ok(Self {
            engine,
            raw: Some(raw),
            state: OperatorState::Created,
        })
    }

    pub fn engine_name(&self) -> &str {
        self.engine.engine_name()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    /// Binds run-time extents. A failure leaves the operator reusable but unconfigured.
    pub fn configure(
        &mut self,
        batch: usize,
        height: usize,
        width: usize,
        pool: &ThreadPool,
    ) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let raw = self.raw_mut(EngineStage::Configure)?;
        match engine.reshape_unpooling2d(raw, batch, height, width, pool) {
            Ok(()) => {
                self.state = OperatorState::Configured {
                    batch,
                    height,
                    width,
                };
                Ok(())
            }
            Err(status) => {
                self.state = OperatorState::Created;
                warn!(
                    target: "unpool::engine",
                    engine = engine.engine_name(),
                    code = status.code(),
                    "configure step failed"
                );
                Err(self.invocation_error(EngineStage::Configure, status))
            }
        }
    }

    /// Runs the configured operator over caller buffers.
    pub fn run(
        &mut self,
        input: &[f32],
        indices: &[u32],
        output: &mut [f32],
        pool: &ThreadPool,
    ) -> Result<()> {
        let (batch, height, width) = match self.state {
            OperatorState::Configured {
                batch,
                height,
                width,
            }
            | OperatorState::Ran {
                batch,
                height,
                width,
            } => (batch, height, width),
            OperatorState::Created => {
                return Err(
                    self.invocation_error(EngineStage::Run, super::EngineStatus::InvalidState)
                );
            }
        };
        let engine = Arc::clone(&self.engine);
        let raw = self.raw_mut(EngineStage::Run)?;
        match engine.run_unpooling2d(raw, input, indices, output, pool) {
            Ok(()) => {
                self.state = OperatorState::Ran {
                    batch,
                    height,
                    width,
                };
                Ok(())
            }
            Err(status) => {
                warn!(
                    target: "unpool::engine",
                    engine = engine.engine_name(),
                    code = status.code(),
                    "run step failed"
                );
                Err(self.invocation_error(EngineStage::Run, status))
            }
        }
    }

    fn raw_mut(&mut self, stage: EngineStage) -> Result<&mut RawOperator> {
        match self.raw.as_mut() {
            Some(raw) => Ok(raw),
            None => Err(UnpoolError::EngineInvocation {
                engine: self.engine.engine_name().to_string(),
                stage,
                status: super::EngineStatus::Uninitialized,
            }),
        }
    }

    fn invocation_error(&self, stage: EngineStage, status: super::EngineStatus) -> UnpoolError {
        UnpoolError::EngineInvocation {
            engine: self.engine.engine_name().to_string(),
            stage,
            status,
        }
    }
}

impl Drop for EngineOperator {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.engine.destroy_operator(raw);
            debug!(
                target: "unpool::engine",
                engine = self.engine.engine_name(),
                "destroyed unpooling operator"
            );
        }
    }
}

impl fmt::Debug for EngineOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOperator")
            .field("engine", &self.engine.engine_name())
            .field("state", &self.state)
            .finish()
    }
}
