use std::sync::Arc;

use unpool::engine::{AcceleratedEngine, EngineStatus};
use unpool::{MaxUnpool, UnpoolError};
use unpool_engine_ref::ReferenceEngine;
use unpool_engine_tests::fixtures::{unpool_node, PoolGeometry};

#[test]
fn oversized_window_fails_engine_creation() {
    let node = unpool_node(
        [1, 1, 1, 1],
        PoolGeometry::non_overlapping([65536, 65536]),
        1,
        None,
    );
    let engine: Arc<dyn AcceleratedEngine> = Arc::new(ReferenceEngine::new());
    let err = MaxUnpool::new(&node, Some(engine)).unwrap_err();
    assert!(matches!(
        err,
        UnpoolError::EngineCreate {
            status: EngineStatus::InvalidParameter,
            ..
        }
    ));
    assert!(!err.is_recoverable());
}
