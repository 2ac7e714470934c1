// ABOUTME: Concurrent plugin registry keyed by command name
// ABOUTME: First registration wins; lookups fail with PluginNotFound

use crate::error::{Error, Result};
use crate::plugin::{Plugin, PluginLoader};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds every plugin available to the dispatch engine.
///
/// Registration is first-wins: a later plugin under an already taken name is
/// ignored with a warning, so startup order decides conflicts.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: DashMap::new(),
        }
    }

    /// Register a plugin under `name`. Returns whether the registration took
    /// effect.
    pub fn register(&self, name: &str, plugin: Arc<dyn Plugin>) -> bool {
        match self.plugins.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!(plugin = name, "plugin already registered, ignoring");
                false
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(plugin);
                info!(plugin = name, "registered plugin");
                true
            }
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        self.plugins
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::PluginNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Resolve `names` through `loader` and register each hit. A name the
    /// loader cannot resolve is logged and skipped; the rest still load.
    pub fn load_plugins(&self, loader: &dyn PluginLoader, names: &[String]) {
        for name in names {
            match loader.load_by_name(name) {
                Ok(plugin) => {
                    self.register(name, plugin);
                }
                Err(err) => {
                    warn!(plugin = %name, error = %err, "failed to load plugin");
                }
            }
        }
    }
}
