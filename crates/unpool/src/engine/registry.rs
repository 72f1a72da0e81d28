//! Runtime engine registry for selecting an accelerated engine by name.
//!
//! Engine crates register a constructor under a name; kernels created through
//! [`crate::MaxUnpool::with_default_engine`] look the engine up here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::AcceleratedEngine;

/// Factory function that creates a new engine instance.
pub type EngineConstructor = Box<dyn Fn() -> Arc<dyn AcceleratedEngine> + Send + Sync>;

/// Global engine registry mapping engine names to constructors.
struct EngineRegistry {
    engines: RwLock<HashMap<String, EngineConstructor>>,
}

impl EngineRegistry {
    fn new() -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: EngineConstructor) {
        self.engines
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn AcceleratedEngine>> {
        let registry = self
            .engines
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_engines(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .engines
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn has_engine(&self, name: &str) -> bool {
        self.engines
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }
}

static GLOBAL_REGISTRY: OnceLock<EngineRegistry> = OnceLock::new();

fn global_registry() -> &'static EngineRegistry {
    GLOBAL_REGISTRY.get_or_init(EngineRegistry::new)
}

/// Register an engine by name. Re-registering a name replaces the previous constructor.
///
/// # Example
/// ```ignore
/// use unpool::engine::registry::register_engine;
///
/// pub fn register() {
///     register_engine("my_engine", || Arc::new(MyEngine::default()));
/// }
/// ```
pub fn register_engine<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Arc<dyn AcceleratedEngine> + Send + Sync + 'static,
{
    global_registry().register(name.into(), Box::new(constructor));
}

/// Create an engine instance by name. Returns `None` if nothing is registered under `name`.
pub fn create_engine(name: &str) -> Option<Arc<dyn AcceleratedEngine>> {
    global_registry().create(name)
}

/// List all registered engine names, sorted.
pub fn list_engines() -> Vec<String> {
    global_registry().list_engines()
}

pub fn has_engine(name: &str) -> bool {
    global_registry().has_engine(name)
}
