//! # Contribution Registry
//!
//! Ordered store of everything plugins contribute before boot. Every entry
//! carries a sequence number; materialization applies entries of one kind in
//! sequence order.
//!
//! Once [`ContributionRegistry::lock`] has been called, every `register_*`
//! call fails with [`KernelError::AlreadyMaterialized`] and leaves the stored
//! contributions untouched. A call that fails validation likewise leaves the
//! registry exactly as it was.

mod contribution;

pub use contribution::{
    CatchAllFactory, ContributionCounts, ContributionKind, ContributionSummary, CoreFactory,
    EnvironmentScope, MiddlewareFactory, MiddlewareOptions, ModelFactory, RoutesFn, SettingsFn,
    StrategyBundle, StrategyFn, StrategyRoutesFn,
};

use crate::error::{KernelError, KernelResult};
use crate::models::is_reserved_model_name;
use crate::shared::DEFAULT_NAMESPACE;
use shared_bus::Listener;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct CoreEntry {
    pub seq: u64,
    pub namespace: String,
    pub field: String,
    pub factory: CoreFactory,
}

#[derive(Clone)]
pub(crate) struct ModelEntry {
    pub seq: u64,
    pub name: String,
    pub factory: ModelFactory,
}

#[derive(Clone)]
pub(crate) struct StrategyEntry {
    pub seq: u64,
    pub owner: Option<String>,
    pub strategy: StrategyFn,
    pub routes: StrategyRoutesFn,
}

#[derive(Clone)]
pub(crate) struct AppSettingEntry {
    pub seq: u64,
    pub environment: Option<String>,
    pub settings: SettingsFn,
}

#[derive(Clone)]
pub(crate) struct MiddlewareEntry {
    pub seq: u64,
    pub environment: Option<String>,
    pub path: String,
    pub factory: MiddlewareFactory,
}

#[derive(Clone)]
pub(crate) struct RoutesEntry {
    pub seq: u64,
    pub routes: RoutesFn,
}

#[derive(Clone)]
pub(crate) struct CatchAllEntry {
    pub seq: u64,
    pub factory: CatchAllFactory,
}

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub seq: u64,
    pub event: String,
    pub listener: Listener,
}

/// Whether an entry scoped to `environment` applies under `active`.
pub(crate) fn applies_to(environment: Option<&str>, active: &str) -> bool {
    environment.map_or(true, |env| env == active)
}

/// Pending contributions plus the lock flag.
#[derive(Clone, Default)]
pub struct ContributionRegistry {
    locked: bool,
    next_seq: u64,
    core: Vec<CoreEntry>,
    models: Vec<ModelEntry>,
    strategies: Vec<StrategyEntry>,
    app_settings: Vec<AppSettingEntry>,
    middleware: Vec<MiddlewareEntry>,
    routes: Vec<RoutesEntry>,
    catch_all: Option<CatchAllEntry>,
    listeners: Vec<ListenerEntry>,
}

impl ContributionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unlocked(&self) -> KernelResult<()> {
        if self.locked {
            Err(KernelError::AlreadyMaterialized)
        } else {
            Ok(())
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Record a core extension in the default namespace.
    pub fn register_core(
        &mut self,
        field: impl Into<String>,
        value: impl Into<CoreFactory>,
    ) -> KernelResult<&mut Self> {
        self.register_core_in(DEFAULT_NAMESPACE, field, value)
    }

    /// Record a core extension in `namespace`.
    pub fn register_core_in(
        &mut self,
        namespace: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<CoreFactory>,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let namespace = namespace.into();
        let field = field.into();
        if field.is_empty() {
            return Err(KernelError::Registration(
                "core field name must be a non-empty string".into(),
            ));
        }
        if namespace.is_empty() {
            return Err(KernelError::Registration(
                "core namespace must be a non-empty string".into(),
            ));
        }

        let seq = self.next_seq();
        debug!(seq, namespace = %namespace, field = %field, "Core extension registered");
        self.core.push(CoreEntry {
            seq,
            namespace,
            field,
            factory: value.into(),
        });
        Ok(self)
    }

    /// Record a model. Reserved and already registered names are refused.
    pub fn register_model(
        &mut self,
        name: impl Into<String>,
        factory: ModelFactory,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let name = name.into();
        if name.is_empty() {
            return Err(KernelError::Registration(
                "model name must be a non-empty string".into(),
            ));
        }
        if is_reserved_model_name(&name) {
            return Err(KernelError::ReservedName(name));
        }
        if self.models.iter().any(|m| m.name == name) {
            return Err(KernelError::Registration(format!(
                "model '{name}' is already registered"
            )));
        }

        let seq = self.next_seq();
        debug!(seq, model = %name, "Model registered");
        self.models.push(ModelEntry { seq, name, factory });
        Ok(self)
    }

    /// Record an identity strategy bundle.
    pub fn register_auth_strategy(&mut self, bundle: StrategyBundle) -> KernelResult<&mut Self> {
        self.push_strategy(None, bundle)
    }

    /// Record the strategy bundle of plugin `owner`. A plugin contributes at
    /// most one strategy.
    pub fn register_auth_strategy_for(
        &mut self,
        owner: impl Into<String>,
        bundle: StrategyBundle,
    ) -> KernelResult<&mut Self> {
        self.push_strategy(Some(owner.into()), bundle)
    }

    fn push_strategy(
        &mut self,
        owner: Option<String>,
        bundle: StrategyBundle,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let (strategy, routes) = bundle.into_parts()?;
        if let Some(owner) = &owner {
            if self
                .strategies
                .iter()
                .any(|s| s.owner.as_deref() == Some(owner.as_str()))
            {
                return Err(KernelError::Registration(format!(
                    "plugin '{owner}' already contributed a strategy"
                )));
            }
        }

        let seq = self.next_seq();
        debug!(seq, owner = ?owner, "Auth strategy registered");
        self.strategies.push(StrategyEntry {
            seq,
            owner,
            strategy,
            routes,
        });
        Ok(self)
    }

    /// Record an app setting for every environment.
    pub fn register_app_setting_fn(&mut self, settings: SettingsFn) -> KernelResult<&mut Self> {
        self.register_app_setting(EnvironmentScope::All, settings)
    }

    /// Record an app setting, one entry per environment in `scope`.
    pub fn register_app_setting(
        &mut self,
        scope: EnvironmentScope,
        settings: SettingsFn,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let environments = scope.expand()?;
        for environment in environments {
            let seq = self.next_seq();
            debug!(seq, environment = ?environment, "App setting registered");
            self.app_settings.push(AppSettingEntry {
                seq,
                environment,
                settings: settings.clone(),
            });
        }
        Ok(self)
    }

    /// Record a middleware for every environment, mounted at `/`.
    pub fn register_middleware_fn(
        &mut self,
        factory: MiddlewareFactory,
    ) -> KernelResult<&mut Self> {
        self.register_middleware(MiddlewareOptions::default(), factory)
    }

    /// Record a middleware, one entry per environment in `options.scope`.
    pub fn register_middleware(
        &mut self,
        options: MiddlewareOptions,
        factory: MiddlewareFactory,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        if !options.path.starts_with('/') {
            return Err(KernelError::Path(options.path));
        }
        let environments = options.scope.expand()?;
        for environment in environments {
            let seq = self.next_seq();
            debug!(seq, environment = ?environment, path = %options.path, "Middleware registered");
            self.middleware.push(MiddlewareEntry {
                seq,
                environment,
                path: options.path.clone(),
                factory: factory.clone(),
            });
        }
        Ok(self)
    }

    pub fn register_routes(&mut self, routes: RoutesFn) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let seq = self.next_seq();
        debug!(seq, "Route installer registered");
        self.routes.push(RoutesEntry { seq, routes });
        Ok(self)
    }

    /// Set the handler for unmatched requests. The last one registered wins.
    pub fn register_catch_all(&mut self, factory: CatchAllFactory) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let seq = self.next_seq();
        if let Some(previous) = &self.catch_all {
            warn!(
                previous = previous.seq,
                replacement = seq,
                "Catch-all handler replaced"
            );
        }
        self.catch_all = Some(CatchAllEntry { seq, factory });
        Ok(self)
    }

    pub fn register_listener(
        &mut self,
        event: impl Into<String>,
        listener: Listener,
    ) -> KernelResult<&mut Self> {
        self.ensure_unlocked()?;
        let event = event.into();
        if event.is_empty() {
            return Err(KernelError::Registration(
                "event name must be a non-empty string".into(),
            ));
        }
        let seq = self.next_seq();
        debug!(seq, event = %event, "Listener registered");
        self.listeners.push(ListenerEntry {
            seq,
            event,
            listener,
        });
        Ok(self)
    }

    /// Freeze the registry. Fails if it is already frozen.
    pub fn lock(&mut self) -> KernelResult<()> {
        self.ensure_unlocked()?;
        self.locked = true;
        debug!(contributions = self.counts().total(), "Registry locked");
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// A copy of the stored contributions.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn counts(&self) -> ContributionCounts {
        ContributionCounts {
            core: self.core.len(),
            models: self.models.len(),
            strategies: self.strategies.len(),
            app_settings: self.app_settings.len(),
            middleware: self.middleware.len(),
            routes: self.routes.len(),
            catch_all: usize::from(self.catch_all.is_some()),
            listeners: self.listeners.len(),
        }
    }

    /// Every stored contribution, in sequence order.
    pub fn summaries(&self) -> Vec<ContributionSummary> {
        use ContributionKind as Kind;

        let mut out = Vec::with_capacity(self.counts().total());
        out.extend(self.core.iter().map(|e| ContributionSummary {
            key: Some(e.field.clone()),
            namespace: Some(e.namespace.clone()),
            ..ContributionSummary::new(e.seq, Kind::CoreExtension)
        }));
        out.extend(self.models.iter().map(|e| ContributionSummary {
            key: Some(e.name.clone()),
            ..ContributionSummary::new(e.seq, Kind::ModelExtension)
        }));
        out.extend(self.strategies.iter().map(|e| ContributionSummary {
            key: e.owner.clone(),
            ..ContributionSummary::new(e.seq, Kind::AuthStrategy)
        }));
        out.extend(self.app_settings.iter().map(|e| ContributionSummary {
            environment: e.environment.clone(),
            ..ContributionSummary::new(e.seq, Kind::AppSetting)
        }));
        out.extend(self.middleware.iter().map(|e| ContributionSummary {
            environment: e.environment.clone(),
            path: Some(e.path.clone()),
            ..ContributionSummary::new(e.seq, Kind::Middleware)
        }));
        out.extend(
            self.routes
                .iter()
                .map(|e| ContributionSummary::new(e.seq, Kind::RouteInstaller)),
        );
        out.extend(
            self.catch_all
                .iter()
                .map(|e| ContributionSummary::new(e.seq, Kind::CatchAll)),
        );
        out.extend(self.listeners.iter().map(|e| ContributionSummary {
            key: Some(e.event.clone()),
            ..ContributionSummary::new(e.seq, Kind::Listener)
        }));
        out.sort_by_key(|s| s.seq);
        out
    }

    pub(crate) fn core_entries(&self) -> &[CoreEntry] {
        &self.core
    }

    pub(crate) fn model_entries(&self) -> &[ModelEntry] {
        &self.models
    }

    pub(crate) fn strategy_entries(&self) -> &[StrategyEntry] {
        &self.strategies
    }

    pub(crate) fn app_setting_entries(&self) -> &[AppSettingEntry] {
        &self.app_settings
    }

    pub(crate) fn middleware_entries(&self) -> &[MiddlewareEntry] {
        &self.middleware
    }

    pub(crate) fn routes_entries(&self) -> &[RoutesEntry] {
        &self.routes
    }

    pub(crate) fn catch_all_entry(&self) -> Option<&CatchAllEntry> {
        self.catch_all.as_ref()
    }

    pub(crate) fn listener_entries(&self) -> &[ListenerEntry] {
        &self.listeners
    }
}
