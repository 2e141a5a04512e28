//! Contribution kinds and the factories they carry.

use crate::app::{AppSettings, Authenticator, Endpoint, KernelContext, Middleware};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::models::{ModelDefinition, ModelHandle};
use crate::ports::{DataStore, IdentityError, IdentityStrategy, ResourceError};
use crate::shared::SharedValue;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Produces a core extension value from the configuration.
#[derive(Clone)]
pub struct CoreFactory(Arc<dyn Fn(&KernelConfig) -> SharedValue + Send + Sync>);

impl CoreFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&KernelConfig) -> SharedValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Factory that always yields `value`.
    pub fn constant(value: SharedValue) -> Self {
        Self::new(move |_| value.clone())
    }

    pub(crate) fn produce(&self, config: &KernelConfig) -> SharedValue {
        (self.0)(config)
    }
}

impl From<SharedValue> for CoreFactory {
    fn from(value: SharedValue) -> Self {
        Self::constant(value)
    }
}

impl From<Value> for CoreFactory {
    fn from(value: Value) -> Self {
        Self::constant(SharedValue::Data(value))
    }
}

/// Defines a model on the data store.
#[derive(Clone)]
pub struct ModelFactory(
    Arc<
        dyn Fn(&dyn DataStore, &KernelConfig) -> Result<Arc<dyn ModelHandle>, ResourceError>
            + Send
            + Sync,
    >,
);

impl ModelFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&dyn DataStore, &KernelConfig) -> Result<Arc<dyn ModelHandle>, ResourceError>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    /// Factory that defines `definition` as is.
    pub fn definition(definition: ModelDefinition) -> Self {
        Self::new(move |store, _| store.define_model(definition.clone()))
    }

    pub(crate) fn build(
        &self,
        store: &dyn DataStore,
        config: &KernelConfig,
    ) -> Result<Arc<dyn ModelHandle>, ResourceError> {
        (self.0)(store, config)
    }
}

/// Adjusts the application settings.
#[derive(Clone)]
pub struct SettingsFn(Arc<dyn Fn(&mut AppSettings, &KernelContext) + Send + Sync>);

impl SettingsFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut AppSettings, &KernelContext) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn apply(&self, settings: &mut AppSettings, context: &KernelContext) {
        (self.0)(settings, context)
    }
}

/// Produces a request middleware once the kernel context exists.
#[derive(Clone)]
pub struct MiddlewareFactory(Arc<dyn Fn(&KernelContext) -> Middleware + Send + Sync>);

impl MiddlewareFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&KernelContext) -> Middleware + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Factory for a middleware that does not need the context.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let middleware = crate::app::middleware_fn(f);
        Self::new(move |_| Arc::clone(&middleware))
    }

    pub(crate) fn produce(&self, context: &KernelContext) -> Middleware {
        (self.0)(context)
    }
}

/// Installs routes on the application router.
#[derive(Clone)]
pub struct RoutesFn(Arc<dyn Fn(Router, &KernelContext) -> Router + Send + Sync>);

impl RoutesFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Router, &KernelContext) -> Router + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn install(&self, router: Router, context: &KernelContext) -> Router {
        (self.0)(router, context)
    }
}

/// Produces the handler for requests no route matched.
#[derive(Clone)]
pub struct CatchAllFactory(Arc<dyn Fn(&KernelContext) -> Endpoint + Send + Sync>);

impl CatchAllFactory {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&KernelContext) -> Endpoint + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Factory for a handler that does not need the context.
    pub fn handler<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        let f = Arc::new(f);
        let endpoint: Endpoint = Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            let fut = f(req);
            Box::pin(async move { fut.await.into_response() })
        });
        Self::new(move |_| Arc::clone(&endpoint))
    }

    pub(crate) fn produce(&self, context: &KernelContext) -> Endpoint {
        (self.0)(context)
    }
}

/// Constructs an identity strategy.
#[derive(Clone)]
pub struct StrategyFn(
    Arc<dyn Fn(&KernelContext) -> Result<Arc<dyn IdentityStrategy>, IdentityError> + Send + Sync>,
);

impl StrategyFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&KernelContext) -> Result<Arc<dyn IdentityStrategy>, IdentityError>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn build(
        &self,
        context: &KernelContext,
    ) -> Result<Arc<dyn IdentityStrategy>, IdentityError> {
        (self.0)(context)
    }
}

/// Mounts the provider-specific endpoints of a strategy.
#[derive(Clone)]
pub struct StrategyRoutesFn(
    Arc<dyn Fn(Router, &Authenticator, &KernelContext) -> Router + Send + Sync>,
);

impl StrategyRoutesFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Router, &Authenticator, &KernelContext) -> Router + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn install(
        &self,
        router: Router,
        authenticator: &Authenticator,
        context: &KernelContext,
    ) -> Router {
        (self.0)(router, authenticator, context)
    }
}

/// An identity-provider bundle. Both halves are required.
#[derive(Clone, Default)]
pub struct StrategyBundle {
    pub strategy: Option<StrategyFn>,
    pub routes: Option<StrategyRoutesFn>,
}

impl StrategyBundle {
    pub fn new(strategy: StrategyFn, routes: StrategyRoutesFn) -> Self {
        Self {
            strategy: Some(strategy),
            routes: Some(routes),
        }
    }

    pub(crate) fn into_parts(self) -> KernelResult<(StrategyFn, StrategyRoutesFn)> {
        match (self.strategy, self.routes) {
            (Some(strategy), Some(routes)) => Ok((strategy, routes)),
            (None, _) => Err(KernelError::Registration(
                "strategy bundle requires a strategy function".into(),
            )),
            (_, None) => Err(KernelError::Registration(
                "strategy bundle requires a routes function".into(),
            )),
        }
    }
}

/// Which environments a contribution applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvironmentScope {
    #[default]
    All,
    Only(Vec<String>),
}

impl EnvironmentScope {
    pub fn only<I, S>(environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(environments.into_iter().map(Into::into).collect())
    }

    /// One entry per environment, or a single unscoped entry. An empty list
    /// matches no environment and expands to nothing.
    pub(crate) fn expand(&self) -> KernelResult<Vec<Option<String>>> {
        match self {
            Self::All => Ok(vec![None]),
            Self::Only(environments) if environments.is_empty() => {
                warn!("Empty environment list, contribution will never apply");
                Ok(Vec::new())
            }
            Self::Only(environments) => environments
                .iter()
                .map(|env| {
                    if env.is_empty() || env.chars().any(char::is_whitespace) {
                        Err(KernelError::Registration(format!(
                            "environment name '{env}' must be non-empty and free of whitespace"
                        )))
                    } else {
                        Ok(Some(env.clone()))
                    }
                })
                .collect(),
        }
    }
}

/// Where and when a middleware runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareOptions {
    pub scope: EnvironmentScope,
    pub path: String,
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            scope: EnvironmentScope::All,
            path: "/".to_string(),
        }
    }
}

impl MiddlewareOptions {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_scope(mut self, scope: EnvironmentScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn in_environments<I, S>(self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_scope(EnvironmentScope::only(environments))
    }
}

/// The kinds of contribution a registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContributionKind {
    CoreExtension,
    ModelExtension,
    AuthStrategy,
    AppSetting,
    Middleware,
    RouteInstaller,
    CatchAll,
    Listener,
}

/// Comparable description of one stored contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributionSummary {
    pub seq: u64,
    pub kind: ContributionKind,
    /// Field, model or event name.
    pub key: Option<String>,
    pub namespace: Option<String>,
    /// `None` means every environment.
    pub environment: Option<String>,
    pub path: Option<String>,
}

impl ContributionSummary {
    pub(crate) fn new(seq: u64, kind: ContributionKind) -> Self {
        Self {
            seq,
            kind,
            key: None,
            namespace: None,
            environment: None,
            path: None,
        }
    }
}

/// Stored contributions per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContributionCounts {
    pub core: usize,
    pub models: usize,
    pub strategies: usize,
    pub app_settings: usize,
    pub middleware: usize,
    pub routes: usize,
    pub catch_all: usize,
    pub listeners: usize,
}

impl ContributionCounts {
    pub fn total(&self) -> usize {
        self.core
            + self.models
            + self.strategies
            + self.app_settings
            + self.middleware
            + self.routes
            + self.catch_all
            + self.listeners
    }
}
