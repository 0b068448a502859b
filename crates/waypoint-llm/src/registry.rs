//! Backend registry
//!
//! Resolves backend names from the route table to live backend instances.

use crate::backend::Backend;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name-based backend lookup
pub trait BackendRegistry: Send + Sync {
    /// Resolve a backend by name, `None` if unknown
    fn resolve(&self, name: &str) -> Option<Arc<dyn Backend>>;

    /// Registered backend names, sorted
    fn names(&self) -> Vec<String>;
}

/// Registry backed by a map, filled at startup
#[derive(Default)]
pub struct InMemoryBackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl InMemoryBackendRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, backend: Arc<dyn Backend>) {
        let name = name.into();
        debug!(backend = %name, "Registering backend");
        self.backends.insert(name, backend);
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with_backend(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.register(name, backend);
        self
    }

    /// Check if a backend is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }
}

impl BackendRegistry for InMemoryBackendRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}
