// ABOUTME: Plugin capability trait, metadata and the loader seam
// ABOUTME: Loaders resolve plugin names to instances; the registry stores them

use crate::payload::Payload;
use crate::reply::Reply;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Execution mode of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    /// Side effects complete on the server; nothing is dispatched to clients.
    ServerOnly,
    /// Every produced payload is dispatched to its target client.
    ServerClient,
}

/// Static facts about a plugin, read once per dispatch.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub plugin_type: PluginType,
    /// Middleware names to chain before `execute`, in order.
    pub middleware: Vec<String>,
}

impl PluginMetadata {
    pub fn server_only() -> Self {
        Self {
            plugin_type: PluginType::ServerOnly,
            middleware: Vec::new(),
        }
    }

    pub fn server_client() -> Self {
        Self {
            plugin_type: PluginType::ServerClient,
            middleware: Vec::new(),
        }
    }

    pub fn with_middleware(mut self, names: Vec<String>) -> Self {
        self.middleware = names;
        self
    }
}

/// A named capability unit: executes chat commands and interprets the
/// worker responses they produce.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called when a chat issues the command. Returns the payloads to send
    /// to the target client(s); may be empty.
    async fn execute(&self, args: &[String]) -> Result<Vec<Payload>>;

    /// Called when a client has responded. Produces the reply to route back
    /// to the originating chat.
    async fn response(&self, payload: Payload) -> Result<Reply>;

    fn metadata(&self) -> PluginMetadata;
}

/// Resolves a plugin name to an instance.
///
/// Implementations may use dynamic libraries, out-of-process execution or a
/// statically compiled factory table; the registry is agnostic.
pub trait PluginLoader: Send + Sync {
    fn load_by_name(&self, name: &str) -> Result<Arc<dyn Plugin>>;
}

/// Factory function producing a plugin instance.
pub type PluginFactory = Box<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Loader backed by a factory table populated at startup.
#[derive(Default)]
pub struct StaticPluginLoader {
    factories: HashMap<String, PluginFactory>,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a plugin factory by name.
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// List registered plugin names.
    pub fn available(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl PluginLoader for StaticPluginLoader {
    fn load_by_name(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("unknown plugin: {}", name))?;
        Ok(factory())
    }
}
