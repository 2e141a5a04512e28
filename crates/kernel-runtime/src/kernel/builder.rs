//! Accumulates contributions and starts the kernel.

use super::{Kernel, LifecycleState, StartMode};
use crate::adapters::{MemoryCacheConnector, MemoryDataStoreConnector};
use crate::app::{AppSettings, KernelContext};
use crate::config::{EnvSource, KernelConfig, RawConfig};
use crate::error::KernelResult;
use crate::materializer::Materializer;
use crate::plugin::{LoadReport, PluginCatalog, PluginLoader, PluginRef, PluginResolver};
use crate::ports::{CacheConnector, DataStoreConnector};
use crate::registry::{
    CatchAllFactory, ContributionRegistry, CoreFactory, EnvironmentScope, MiddlewareFactory,
    MiddlewareOptions, ModelFactory, RoutesFn, SettingsFn, StrategyBundle,
};
use crate::supervisor::{self, ClusterOptions, ClusterRole};
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use shared_bus::{InMemoryEventBus, KernelEvent, SharedEventBus};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// A kernel accepting contributions.
///
/// `start` consumes the builder, so a kernel is materialized at most once.
pub struct KernelBuilder {
    state: LifecycleState,
    config: Arc<KernelConfig>,
    registry: ContributionRegistry,
    events: SharedEventBus,
    resolver: Arc<dyn PluginResolver>,
    data_stores: Arc<dyn DataStoreConnector>,
    caches: Arc<dyn CacheConnector>,
}

impl KernelBuilder {
    /// Normalize `raw` against the process environment.
    pub fn new(raw: RawConfig) -> KernelResult<Self> {
        Self::from_config(KernelConfig::from_raw(raw)?)
    }

    /// Normalize `raw` against `env`.
    pub fn with_env(raw: RawConfig, env: &impl EnvSource) -> KernelResult<Self> {
        Self::from_config(KernelConfig::normalize(raw, env)?)
    }

    pub fn from_config(config: KernelConfig) -> KernelResult<Self> {
        let mut state = LifecycleState::Constructed;
        state.advance(LifecycleState::AcceptingContributions)?;
        Ok(Self {
            state,
            config: Arc::new(config),
            registry: ContributionRegistry::new(),
            events: Arc::new(InMemoryEventBus::new()),
            resolver: Arc::new(PluginCatalog::with_builtins()),
            data_stores: Arc::new(MemoryDataStoreConnector::new()),
            caches: Arc::new(MemoryCacheConnector::new()),
        })
    }

    /// Resolver for plugins loaded by name.
    pub fn with_resolver(mut self, resolver: Arc<dyn PluginResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_data_store_connector(mut self, connector: Arc<dyn DataStoreConnector>) -> Self {
        self.data_stores = connector;
        self
    }

    pub fn with_cache_connector(mut self, connector: Arc<dyn CacheConnector>) -> Self {
        self.caches = connector;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn registry(&self) -> &ContributionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ContributionRegistry {
        &mut self.registry
    }

    /// The bus the kernel will emit on. Subscribe before `start` to observe
    /// `started`.
    pub fn events(&self) -> SharedEventBus {
        Arc::clone(&self.events)
    }

    pub fn core(
        &mut self,
        field: impl Into<String>,
        value: impl Into<CoreFactory>,
    ) -> KernelResult<&mut Self> {
        self.registry.register_core(field, value)?;
        Ok(self)
    }

    pub fn core_in(
        &mut self,
        namespace: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<CoreFactory>,
    ) -> KernelResult<&mut Self> {
        self.registry.register_core_in(namespace, field, value)?;
        Ok(self)
    }

    pub fn model(&mut self, name: impl Into<String>, factory: ModelFactory) -> KernelResult<&mut Self> {
        self.registry.register_model(name, factory)?;
        Ok(self)
    }

    pub fn strategy(&mut self, bundle: StrategyBundle) -> KernelResult<&mut Self> {
        self.registry.register_auth_strategy(bundle)?;
        Ok(self)
    }

    pub fn app_setting<F>(&mut self, scope: EnvironmentScope, f: F) -> KernelResult<&mut Self>
    where
        F: Fn(&mut AppSettings, &KernelContext) + Send + Sync + 'static,
    {
        self.registry.register_app_setting(scope, SettingsFn::new(f))?;
        Ok(self)
    }

    pub fn middleware<F, Fut>(&mut self, options: MiddlewareOptions, f: F) -> KernelResult<&mut Self>
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.registry
            .register_middleware(options, MiddlewareFactory::from_fn(f))?;
        Ok(self)
    }

    pub fn routes<F>(&mut self, f: F) -> KernelResult<&mut Self>
    where
        F: Fn(Router, &KernelContext) -> Router + Send + Sync + 'static,
    {
        self.registry.register_routes(RoutesFn::new(f))?;
        Ok(self)
    }

    pub fn catch_all<F, Fut, R>(&mut self, f: F) -> KernelResult<&mut Self>
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.registry.register_catch_all(CatchAllFactory::handler(f))?;
        Ok(self)
    }

    pub fn on<F>(&mut self, event: impl Into<String>, listener: F) -> KernelResult<&mut Self>
    where
        F: Fn(&KernelEvent) + Send + Sync + 'static,
    {
        self.registry.register_listener(event, Arc::new(listener))?;
        Ok(self)
    }

    /// Load a plugin, given by value or by name.
    pub fn use_plugin(&mut self, plugin: impl Into<PluginRef>) -> KernelResult<LoadReport> {
        PluginLoader::new(Arc::clone(&self.resolver)).load(&mut self.registry, plugin)
    }

    /// Materialize and bind according to `mode`.
    pub async fn start(mut self, mode: StartMode) -> KernelResult<Kernel> {
        self.state.advance(LifecycleState::Materializing)?;
        info!("===========================================");
        info!("  Plexus Kernel v{}", env!("CARGO_PKG_VERSION"));
        info!("  Environment: {}", self.config.environment());
        info!("  Contributions: {}", self.registry.counts().total());
        info!("===========================================");

        let mut materializer =
            Materializer::new(Arc::clone(&self.data_stores), Arc::clone(&self.caches));
        let materialized = match materializer
            .materialize(&mut self.registry, Arc::clone(&self.config), Arc::clone(&self.events))
            .await
        {
            Ok(materialized) => materialized,
            Err(e) => {
                self.state.advance(LifecycleState::Stopped)?;
                return Err(e);
            }
        };

        Kernel::launch(materialized, mode, self.caches).await
    }

    /// Start as coordinator or worker depending on `options`.
    pub async fn start_cluster(
        self,
        mode: StartMode,
        options: ClusterOptions,
    ) -> KernelResult<ClusterRole> {
        supervisor::start_cluster(self, mode, options).await
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("contributions", &self.registry.counts())
            .finish()
    }
}
