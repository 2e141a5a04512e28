//! Name to plugin resolution.

use super::builtin::{api_key_plugin, status_plugin, API_KEY_PLUGIN, STATUS_PLUGIN};
use super::Plugin;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Resolves plugin names.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Plugin>;
}

type PluginConstructor = Arc<dyn Fn() -> Plugin + Send + Sync>;

/// In-process plugin table. Each resolution builds a fresh plugin value.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    constructors: IndexMap<String, PluginConstructor>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the plugins shipped with the runtime.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register(STATUS_PLUGIN, status_plugin);
        catalog.register(API_KEY_PLUGIN, api_key_plugin);
        catalog
    }

    /// Register `constructor` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Plugin + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

impl PluginResolver for PluginCatalog {
    fn resolve(&self, name: &str) -> Option<Plugin> {
        self.constructors.get(name).map(|constructor| constructor())
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
