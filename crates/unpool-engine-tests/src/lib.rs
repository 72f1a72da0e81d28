pub use anyhow;

pub mod conformance;
pub mod fixtures;
pub mod recording_engine;

pub use recording_engine::{EngineLog, RecordingEngine};

/// Expands to a test module that runs the shared conformance suite against one engine.
///
/// `$engine_ctor` is any callable returning `Arc<E>` with `E: AcceleratedEngine + 'static`.
#[macro_export]
macro_rules! define_engine_tests {
    ($module:ident, $engine_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::conformance;

            macro_rules! conformance_test {
                ($name:ident) => {
                    #[test]
                    fn $name() {
                        let engine = ($engine_ctor)();
                        conformance::$name(&engine);
                    }
                };
            }

            conformance_test!(unpool_matches_naive_scatter);
            conformance_test!(rectangular_window_matches_naive_scatter);
            conformance_test!(leading_padding_is_cropped);
            conformance_test!(parallel_run_matches_sequential);
            conformance_test!(reconfigure_handles_new_batch);
            conformance_test!(rejects_index_outside_window);
            conformance_test!(kernel_paths_agree);

            #[test]
            fn check_engine_reports_success() -> $crate::anyhow::Result<()> {
                let engine = ($engine_ctor)();
                conformance::check_engine(&engine)
            }
        }
    };
}
