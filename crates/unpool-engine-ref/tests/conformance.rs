use std::sync::Arc;

use unpool_engine_ref::ReferenceEngine;
use unpool_engine_tests::define_engine_tests;

define_engine_tests!(reference_engine, || Arc::new(ReferenceEngine::new()));
