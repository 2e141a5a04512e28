//! The materialized kernel state handed to factories and requests.

use crate::config::KernelConfig;
use crate::models::{ModelHandle, ModelTable};
use crate::ports::{CacheStore, DataStore};
use crate::shared::SharedNamespaces;
use serde_json::Value;
use shared_bus::{EventPublisher, SharedEventBus};
use std::fmt;
use std::sync::Arc;

/// Everything a contribution may need once resources are open.
///
/// Cloning is cheap; all parts are reference counted.
#[derive(Clone)]
pub struct KernelContext {
    config: Arc<KernelConfig>,
    shared: Arc<SharedNamespaces>,
    models: Arc<ModelTable>,
    events: SharedEventBus,
    cache: Arc<dyn CacheStore>,
    data_store: Arc<dyn DataStore>,
}

impl KernelContext {
    pub(crate) fn new(
        config: Arc<KernelConfig>,
        shared: Arc<SharedNamespaces>,
        models: Arc<ModelTable>,
        events: SharedEventBus,
        cache: Arc<dyn CacheStore>,
        data_store: Arc<dyn DataStore>,
    ) -> Self {
        Self {
            config,
            shared,
            models,
            events,
            cache,
            data_store,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn shared(&self) -> &SharedNamespaces {
        &self.shared
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<Arc<dyn ModelHandle>> {
        self.models.get(name)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        Arc::clone(&self.cache)
    }

    pub fn data_store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.data_store)
    }

    /// Emit a lifecycle or user event. Returns the number of listeners called.
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.events.emit(name, payload)
    }
}

impl fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelContext")
            .field("environment", &self.config.environment())
            .field("namespaces", &self.shared.namespaces().collect::<Vec<_>>())
            .field("models", &self.models)
            .field("cache", &self.cache.url())
            .field("data_store", &self.data_store.url())
            .finish()
    }
}
