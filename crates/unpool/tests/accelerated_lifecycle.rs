use std::sync::Arc;

use unpool::engine::{registry, AcceleratedEngine, EngineStatus, OperatorState};
use unpool::error::EngineStage;
use unpool::kernel::ExecutionPath;
use unpool::{HostAllocator, KernelContext, MaxUnpool, Tensor, ThreadPool, UnpoolError};
use unpool_engine_tests::fixtures::{run_kernel, unpool_node, PoolGeometry};
use unpool_engine_tests::RecordingEngine;

struct Setup {
    engine: Arc<RecordingEngine>,
    kernel: MaxUnpool,
    x: Tensor,
    indices: Tensor,
}

fn setup() -> Setup {
    let engine = Arc::new(RecordingEngine::new());
    let dyn_engine: Arc<dyn AcceleratedEngine> = engine.clone();
    let node = unpool_node(
        [1, 2, 2, 1],
        PoolGeometry::non_overlapping([2, 2]),
        1,
        Some([1, 4, 4, 1]),
    );
    let kernel = MaxUnpool::new(&node, Some(dyn_engine)).unwrap();
    Setup {
        engine,
        kernel,
        x: Tensor::from_f32([1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        indices: Tensor::from_i64([1, 2, 2, 1], vec![0, 3, 1, 2]).unwrap(),
    }
}

#[test]
fn operator_is_created_once_and_destroyed_on_drop() {
    let Setup {
        engine,
        mut kernel,
        x,
        indices,
    } = setup();
    let pool = ThreadPool::sequential();
    assert_eq!(kernel.operator_state(), Some(OperatorState::Created));

    for _ in 0..3 {
        let out = run_kernel(&mut kernel, &x, &indices, None, &pool).unwrap();
        assert_eq!(out.dims(), &[1, 4, 4, 1]);
        assert!(out.data().iter().all(|&v| v == 1.0));
    }
    assert_eq!(
        kernel.operator_state(),
        Some(OperatorState::Ran {
            batch: 1,
            height: 2,
            width: 2
        })
    );

    let log = engine.log();
    assert_eq!(log.created.len(), 1);
    assert_eq!(log.reshaped, vec![(0, 1, 2, 2); 3]);
    assert_eq!(log.ran.len(), 3);
    assert_eq!(log.ran[0].1, vec![0, 3, 1, 2]);
    assert!(log.destroyed.is_empty());

    drop(kernel);
    let log = engine.log();
    assert_eq!(log.destroyed, vec![0]);
    assert_eq!(log.ran.len(), 3);
    assert_eq!(engine.live_operators(), 0);
}

#[test]
fn configure_failure_leaves_output_unallocated_and_handle_reusable() {
    let Setup {
        engine,
        mut kernel,
        x,
        indices,
    } = setup();
    let pool = ThreadPool::sequential();
    engine.set_reshape_failure(Some(EngineStatus::OutOfMemory));

    let views = [x.view(), indices.view()];
    let mut allocator = HostAllocator::new();
    let mut ctx = KernelContext::new(&views, &mut allocator, &pool);
    let err = kernel.compute(&mut ctx).unwrap_err();
    assert_eq!(
        err,
        UnpoolError::EngineInvocation {
            engine: "recording".into(),
            stage: EngineStage::Configure,
            status: EngineStatus::OutOfMemory
        }
    );
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("code 6"));
    assert!(allocator.output(0).is_none());
    assert_eq!(kernel.operator_state(), Some(OperatorState::Created));
    assert!(engine.log().ran.is_empty());

    engine.set_reshape_failure(None);
    let out = run_kernel(&mut kernel, &x, &indices, None, &pool).unwrap();
    assert!(out.data().iter().all(|&v| v == 1.0));
    let log = engine.log();
    assert_eq!(log.created.len(), 1);
    assert_eq!(log.ran.len(), 1);
}

#[test]
fn run_failure_is_recoverable() {
    let Setup {
        engine,
        mut kernel,
        x,
        indices,
    } = setup();
    let pool = ThreadPool::sequential();
    engine.set_run_failure(Some(EngineStatus::Other(42)));
    let err = run_kernel(&mut kernel, &x, &indices, None, &pool).unwrap_err();
    assert!(matches!(
        err,
        UnpoolError::EngineInvocation {
            stage: EngineStage::Run,
            status: EngineStatus::Other(42),
            ..
        }
    ));
    assert!(err.is_recoverable());

    engine.set_run_failure(None);
    assert!(run_kernel(&mut kernel, &x, &indices, None, &pool).is_ok());
    assert_eq!(engine.log().created.len(), 1);
}

#[test]
fn indices_wider_than_32_bits_are_rejected_before_configure() {
    let Setup {
        engine,
        mut kernel,
        x,
        ..
    } = setup();
    let wide = Tensor::from_i64([1, 2, 2, 1], vec![0, 1, 1 << 33, 2]).unwrap();
    let err = run_kernel(&mut kernel, &x, &wide, None, &ThreadPool::sequential()).unwrap_err();
    assert_eq!(
        err,
        UnpoolError::IndexNarrowing {
            position: 2,
            value: 1 << 33
        }
    );
    assert!(engine.log().reshaped.is_empty());
}

#[test]
fn output_allocation_failure_is_reported() {
    let Setup {
        engine,
        mut kernel,
        x,
        indices,
    } = setup();
    let pool = ThreadPool::sequential();
    let views = [x.view(), indices.view()];
    // Room for the 16-byte index scratch but not the 64-byte output.
    let mut allocator = HostAllocator::with_byte_limit(32);
    let mut ctx = KernelContext::new(&views, &mut allocator, &pool);
    let err = kernel.compute(&mut ctx).unwrap_err();
    assert!(matches!(err, UnpoolError::Allocation { what: "output", .. }));
    assert_eq!(allocator.temp_allocations(), 1);
    assert!(engine.log().ran.is_empty());
}

#[test]
fn default_engine_is_resolved_from_the_registry() {
    let engine = Arc::new(RecordingEngine::new());
    let shared = Arc::clone(&engine);
    registry::register_engine(unpool::config::engine_name(), move || {
        let engine: Arc<dyn AcceleratedEngine> = shared.clone();
        engine
    });

    let geometry = PoolGeometry::non_overlapping([2, 2]);
    let accelerated =
        MaxUnpool::with_default_engine(&unpool_node([1, 2, 2, 1], geometry, 1, Some([1, 4, 4, 1])))
            .unwrap();
    assert_eq!(accelerated.execution_path(), ExecutionPath::Accelerated);
    assert_eq!(engine.live_operators(), 1);
    drop(accelerated);
    assert_eq!(engine.live_operators(), 0);

    let generic = MaxUnpool::with_default_engine(&unpool_node([1, 2, 2, 1], geometry, 0, None))
        .unwrap();
    assert_eq!(generic.execution_path(), ExecutionPath::Generic);
}
