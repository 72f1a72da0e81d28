mod engine;

pub use engine::ReferenceEngine;

/// Register the reference engine with the global engine registry under `"reference"`.
///
/// Called automatically from a static initializer; calling it again is harmless.
pub fn register_reference_engine() {
    unpool::engine::registry::register_engine("reference", ReferenceEngine::create);
}

// Auto-register on library load
#[cfg(not(target_family = "wasm"))]
#[used]
#[link_section = ".init_array"]
static REGISTER_REFERENCE_ENGINE: extern "C" fn() = {
    extern "C" fn register() {
        register_reference_engine();
    }
    register
};
