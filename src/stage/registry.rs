//! Registry mapping stage names to executor factories.
//!
//! The registry is an explicit object injected into the controller, never
//! a process-wide singleton, so tests and independent pipelines can use
//! isolated registries. Factories are resolved lazily: a fresh executor
//! is constructed on every `get`.

use std::collections::HashMap;

use super::executor::StageExecutor;

type StageFactory = Box<dyn Fn() -> Box<dyn StageExecutor> + Send + Sync>;

/// Maps stage names to zero-argument executor factories.
#[derive(Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a stage name.
    ///
    /// The last registration for a name wins; re-registering is the
    /// supported way to override a built-in executor with a custom one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn StageExecutor> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Construct a new executor for the named stage, or `None` if no
    /// factory is registered.
    pub fn get(&self, name: &str) -> Option<Box<dyn StageExecutor>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Names of all registered stages, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.registered_names())
            .finish()
    }
}
