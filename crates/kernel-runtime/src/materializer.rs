//! # Materializer
//!
//! The one-shot transition from a registry of declarations to a live
//! object graph:
//!
//! ```text
//! Idle → Locking → ConnectingResources → InjectingCore
//!      → BuildingModels → BuildingApp → Ready
//! ```
//!
//! Any failure moves to `Aborted`: connections opened so far are closed
//! best-effort and the error is returned. No partially built state escapes.

use crate::app::{self, AppSettings, Authenticator, KernelContext};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::models::ModelTable;
use crate::ports::{CacheConnector, CacheStore, DataStore, DataStoreConnector};
use crate::registry::ContributionRegistry;
use crate::shared::SharedNamespaces;
use axum::Router;
use shared_bus::SharedEventBus;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Progress of a [`Materializer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializePhase {
    Idle,
    Locking,
    ConnectingResources,
    InjectingCore,
    BuildingModels,
    BuildingApp,
    Ready,
    Aborted,
}

/// Result of a successful materialization.
pub struct Materialized {
    pub context: KernelContext,
    pub settings: AppSettings,
    pub router: Router,
    pub authenticator: Authenticator,
}

/// Runs the boot sequence once.
pub struct Materializer {
    data_stores: Arc<dyn DataStoreConnector>,
    caches: Arc<dyn CacheConnector>,
    phase: MaterializePhase,
}

impl Materializer {
    pub fn new(data_stores: Arc<dyn DataStoreConnector>, caches: Arc<dyn CacheConnector>) -> Self {
        Self {
            data_stores,
            caches,
            phase: MaterializePhase::Idle,
        }
    }

    pub fn phase(&self) -> MaterializePhase {
        self.phase
    }

    fn enter(&mut self, phase: MaterializePhase) {
        debug!(from = ?self.phase, to = ?phase, "Materializer phase");
        self.phase = phase;
    }

    /// Lock `registry` and build everything it declares.
    ///
    /// Fails with [`KernelError::AlreadyMaterialized`] if this materializer
    /// already ran or the registry is already locked; neither case has side
    /// effects.
    #[instrument(skip_all, fields(environment = %config.environment()))]
    pub async fn materialize(
        &mut self,
        registry: &mut ContributionRegistry,
        config: Arc<KernelConfig>,
        events: SharedEventBus,
    ) -> KernelResult<Materialized> {
        if self.phase != MaterializePhase::Idle {
            return Err(KernelError::AlreadyMaterialized);
        }

        self.enter(MaterializePhase::Locking);
        if let Err(e) = registry.lock() {
            self.phase = MaterializePhase::Aborted;
            return Err(e);
        }
        for entry in registry.listener_entries() {
            events.on(entry.event.clone(), Arc::clone(&entry.listener));
        }

        self.enter(MaterializePhase::ConnectingResources);
        let cache = match self.caches.connect(config.cache_url()).await {
            Ok(cache) => cache,
            Err(e) => return Err(self.abort(e.into(), None, None).await),
        };
        info!(url = %cache.url(), "Cache store connected");
        let data_store = match self.data_stores.connect(config.data_store_url()).await {
            Ok(store) => store,
            Err(e) => return Err(self.abort(e.into(), Some(&cache), None).await),
        };
        info!(url = %data_store.url(), "Data store connected");

        match self.build(registry, config, events, &cache, &data_store) {
            Ok(materialized) => {
                self.enter(MaterializePhase::Ready);
                Ok(materialized)
            }
            Err(e) => Err(self.abort(e, Some(&cache), Some(&data_store)).await),
        }
    }

    fn build(
        &mut self,
        registry: &ContributionRegistry,
        config: Arc<KernelConfig>,
        events: SharedEventBus,
        cache: &Arc<dyn CacheStore>,
        data_store: &Arc<dyn DataStore>,
    ) -> KernelResult<Materialized> {
        self.enter(MaterializePhase::InjectingCore);
        let mut shared = SharedNamespaces::new();
        for entry in registry.core_entries() {
            let value = entry.factory.produce(&config);
            let kind = value.kind();
            shared.insert(&entry.namespace, &entry.field, value)?;
            info!(namespace = %entry.namespace, field = %entry.field, kind, "Core extension injected");
        }

        self.enter(MaterializePhase::BuildingModels);
        let mut models = ModelTable::with_builtins(data_store.as_ref())?;
        for entry in registry.model_entries() {
            let handle = entry.factory.build(data_store.as_ref(), &config)?;
            models.insert(&entry.name, handle)?;
            info!(model = %entry.name, "Model defined");
        }

        self.enter(MaterializePhase::BuildingApp);
        let context = KernelContext::new(
            config,
            Arc::new(shared),
            Arc::new(models),
            events,
            Arc::clone(cache),
            Arc::clone(data_store),
        );
        let assembled = app::assemble(registry, &context)?;

        Ok(Materialized {
            context,
            settings: assembled.settings,
            router: assembled.router,
            authenticator: assembled.authenticator,
        })
    }

    async fn abort(
        &mut self,
        error: KernelError,
        cache: Option<&Arc<dyn CacheStore>>,
        data_store: Option<&Arc<dyn DataStore>>,
    ) -> KernelError {
        error!(phase = ?self.phase, error = %error, "Materialization aborted");
        self.phase = MaterializePhase::Aborted;

        if let Some(store) = data_store {
            if let Err(e) = store.close().await {
                warn!(error = %e, "Failed to close data store after abort");
            }
        }
        if let Some(cache) = cache {
            if let Err(e) = cache.close().await {
                warn!(error = %e, "Failed to close cache store after abort");
            }
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryCacheConnector, MemoryDataStoreConnector};
    use crate::config::RawConfig;
    use crate::models::ModelDefinition;
    use crate::ports::ResourceError;
    use crate::registry::ModelFactory;
    use crate::shared::SharedValue;
    use async_trait::async_trait;
    use serde_json::json;
    use shared_bus::InMemoryEventBus;
    use std::collections::HashMap;

    fn config() -> Arc<KernelConfig> {
        let raw = RawConfig::new()
            .with_host_url("http://localhost:3000/")
            .with_secret("a-long-enough-secret")
            .with_data_store_url("memory://test")
            .with_cache_url("memory://test");
        Arc::new(KernelConfig::normalize(raw, &HashMap::<String, String>::new()).unwrap())
    }

    fn materializer() -> (Materializer, Arc<MemoryDataStoreConnector>, Arc<MemoryCacheConnector>) {
        let stores = Arc::new(MemoryDataStoreConnector::new());
        let caches = Arc::new(MemoryCacheConnector::new());
        (
            Materializer::new(stores.clone(), caches.clone()),
            stores,
            caches,
        )
    }

    #[tokio::test]
    async fn test_materialize_injects_core_and_models() {
        let (mut materializer, _, _) = materializer();
        let mut registry = ContributionRegistry::new();
        registry
            .register_core(
                "sum",
                SharedValue::function(|args| {
                    Ok(json!(args.iter().filter_map(|a| a.as_i64()).sum::<i64>()))
                }),
            )
            .unwrap()
            .register_model(
                "Article",
                ModelFactory::definition(ModelDefinition::new("Article", "articles")),
            )
            .unwrap();

        let materialized = materializer
            .materialize(&mut registry, config(), Arc::new(InMemoryEventBus::new()))
            .await
            .unwrap();

        assert_eq!(materializer.phase(), MaterializePhase::Ready);
        assert!(registry.is_locked());
        let shared = materialized.context.shared();
        assert_eq!(shared.call("shared", "sum", &[json!(2), json!(2)]).unwrap(), json!(4));
        let models: Vec<_> = materialized.context.models().names().collect();
        assert_eq!(models, vec!["User", "Message", "Article"]);
    }

    #[tokio::test]
    async fn test_collision_aborts_and_closes_resources() {
        let (mut materializer, stores, caches) = materializer();
        let mut registry = ContributionRegistry::new();
        registry
            .register_core("dup", json!(1))
            .unwrap()
            .register_core("dup", json!(2))
            .unwrap();

        let result = materializer
            .materialize(&mut registry, config(), Arc::new(InMemoryEventBus::new()))
            .await;

        assert!(matches!(
            result,
            Err(KernelError::NamespaceCollision { ref namespace, ref field })
                if namespace == "shared" && field == "dup"
        ));
        assert_eq!(materializer.phase(), MaterializePhase::Aborted);
        assert_eq!(stores.connections(), 1);
        assert_eq!(caches.connections(), 1);
    }

    #[tokio::test]
    async fn test_second_run_has_no_side_effects() {
        let (mut materializer, stores, _) = materializer();
        let mut registry = ContributionRegistry::new();
        materializer
            .materialize(&mut registry, config(), Arc::new(InMemoryEventBus::new()))
            .await
            .unwrap();

        let second = materializer
            .materialize(&mut registry, config(), Arc::new(InMemoryEventBus::new()))
            .await;

        assert!(matches!(second, Err(KernelError::AlreadyMaterialized)));
        assert_eq!(stores.connections(), 1);
    }

    struct RefusingCache;

    #[async_trait]
    impl CacheConnector for RefusingCache {
        async fn connect(&self, url: &str) -> Result<Arc<dyn CacheStore>, ResourceError> {
            Err(ResourceError::Connect {
                resource: "cache",
                url: url.to_string(),
                reason: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_before_data_store() {
        let stores = Arc::new(MemoryDataStoreConnector::new());
        let mut materializer = Materializer::new(stores.clone(), Arc::new(RefusingCache));
        let mut registry = ContributionRegistry::new();

        let result = materializer
            .materialize(&mut registry, config(), Arc::new(InMemoryEventBus::new()))
            .await;

        assert!(matches!(result, Err(KernelError::Resource(ResourceError::Connect { .. }))));
        assert_eq!(stores.connections(), 0);
        assert_eq!(materializer.phase(), MaterializePhase::Aborted);
    }
}
