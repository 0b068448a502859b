//! Scripted backends for dry runs
//!
//! Provider clients are not part of this binary. Every backend name the
//! configuration references is registered as a [`ScriptedBackend`] so the
//! routing layer can be validated and exercised end to end.

use std::collections::BTreeMap;
use std::sync::Arc;
use waypoint_core::{RouteDefinition, RoutingConfig};
use waypoint_llm::{Backend, BackendRegistry, InMemoryBackendRegistry, ScriptedBackend};

/// Scripted backends keyed by name
pub struct ScriptedBackends {
    backends: BTreeMap<String, Arc<ScriptedBackend>>,
}

fn collect<'a>(route: &'a RouteDefinition, names: &mut Vec<&'a str>) {
    names.push(&route.primary_backend);
    if let Some(fallback) = &route.fallback_backend {
        names.push(fallback);
    }
    for alternative in &route.alternatives {
        collect(alternative, names);
    }
}

impl ScriptedBackends {
    /// One scripted backend per name referenced by `config`
    #[must_use]
    pub fn for_config(config: &RoutingConfig) -> Self {
        let mut names = Vec::new();
        for route in config.default_route.iter().chain(config.routes.values()) {
            collect(route, &mut names);
        }

        let backends = names
            .into_iter()
            .filter(|name| !name.trim().is_empty())
            .map(|name| (name.to_string(), Arc::new(ScriptedBackend::new(name))))
            .collect();
        Self { backends }
    }

    /// Registry resolving every scripted backend
    #[must_use]
    pub fn registry(&self) -> Arc<dyn BackendRegistry> {
        let mut registry = InMemoryBackendRegistry::new();
        for (name, backend) in &self.backends {
            registry.register(name.clone(), Arc::clone(backend) as Arc<dyn Backend>);
        }
        Arc::new(registry)
    }

    /// Look up a scripted backend
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ScriptedBackend>> {
        self.backends.get(name)
    }
}
