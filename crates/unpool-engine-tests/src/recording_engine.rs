use std::sync::Mutex;

use unpool::engine::{AcceleratedEngine, EngineStatus, RawOperator, Unpooling2dDescriptor};
use unpool::ThreadPool;

/// Calls observed by a [`RecordingEngine`], in order of arrival.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineLog {
    pub created: Vec<Unpooling2dDescriptor>,
    /// `(operator id, batch, height, width)` per configure call.
    pub reshaped: Vec<(usize, usize, usize, usize)>,
    /// `(operator id, indices)` per run call.
    pub ran: Vec<(usize, Vec<u32>)>,
    pub destroyed: Vec<usize>,
}

#[derive(Debug, Default)]
struct Failures {
    create: Option<EngineStatus>,
    reshape: Option<EngineStatus>,
    run: Option<EngineStatus>,
}

struct RecordedOperator {
    id: usize,
}

/// Test-only engine that records every call and can be told to fail any stage.
///
/// A successful run writes `1.0` to every output element so callers can tell the engine
/// actually touched the buffer.
#[derive(Default)]
pub struct RecordingEngine {
    log: Mutex<EngineLog>,
    failures: Mutex<Failures>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(status: EngineStatus) -> Self {
        let engine = Self::default();
        engine.failures.lock().expect("engine mutex poisoned").create = Some(status);
        engine
    }

    pub fn set_reshape_failure(&self, status: Option<EngineStatus>) {
        self.failures.lock().expect("engine mutex poisoned").reshape = status;
    }

    pub fn set_run_failure(&self, status: Option<EngineStatus>) {
        self.failures.lock().expect("engine mutex poisoned").run = status;
    }

    pub fn log(&self) -> EngineLog {
        self.log.lock().expect("engine mutex poisoned").clone()
    }

    /// Operators created and not yet destroyed.
    pub fn live_operators(&self) -> usize {
        let log = self.log.lock().expect("engine mutex poisoned");
        log.created.len() - log.destroyed.len()
    }

    fn failure(&self, pick: impl FnOnce(&Failures) -> Option<EngineStatus>) -> Option<EngineStatus> {
        let failures = self.failures.lock().expect("engine mutex poisoned");
        pick(&*failures)
    }
}

fn operator_id(op: &RawOperator) -> Result<usize, EngineStatus> {
    op.downcast_ref::<RecordedOperator>()
        .map(|op| op.id)
        .ok_or(EngineStatus::InvalidParameter)
}

impl AcceleratedEngine for RecordingEngine {
    fn engine_name(&self) -> &str {
        "recording"
    }

    fn create_unpooling2d(&self, desc: &Unpooling2dDescriptor) -> Result<RawOperator, EngineStatus> {
        if let Some(status) = self.failure(|f| f.create) {
            return Err(status);
        }
        let mut log = self.log.lock().expect("engine mutex poisoned");
        log.created.push(*desc);
        Ok(Box::new(RecordedOperator {
            id: log.created.len() - 1,
        }))
    }

    fn reshape_unpooling2d(
        &self,
        op: &mut RawOperator,
        batch: usize,
        height: usize,
        width: usize,
        _pool: &ThreadPool,
    ) -> Result<(), EngineStatus> {
        let id = operator_id(op)?;
        self.log
            .lock()
            .expect("engine mutex poisoned")
            .reshaped
            .push((id, batch, height, width));
        match self.failure(|f| f.reshape) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn run_unpooling2d(
        &self,
        op: &mut RawOperator,
        _input: &[f32],
        indices: &[u32],
        output: &mut [f32],
        _pool: &ThreadPool,
    ) -> Result<(), EngineStatus> {
        let id = operator_id(op)?;
        self.log
            .lock()
            .expect("engine mutex poisoned")
            .ran
            .push((id, indices.to_vec()));
        if let Some(status) = self.failure(|f| f.run) {
            return Err(status);
        }
        output.fill(1.0);
        Ok(())
    }

    fn destroy_operator(&self, op: RawOperator) {
        if let Ok(id) = operator_id(&op) {
            self.log
                .lock()
                .expect("engine mutex poisoned")
                .destroyed
                .push(id);
        }
    }
}
