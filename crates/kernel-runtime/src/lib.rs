//! # Plexus Kernel Runtime
//!
//! A service kernel assembled from plugin contributions.
//!
//! ## Lifecycle
//!
//! ```text
//! RawConfig ──normalize──► KernelBuilder ──start──► Kernel
//!                           │  register_* / use_plugin      │
//!                           │                               ├── headless ("app")
//!                           └──start_cluster──► Coordinator └── http (port)
//!                                               └── workers (each a Kernel)
//! ```
//!
//! 1. Normalize configuration (host URL, secret, data store, cache)
//! 2. Accept contributions: core values, models, strategies, settings,
//!    middleware, routes, catch-all, listeners
//! 3. Materialize once: lock, connect, inject core, build models, build app
//! 4. Run until shutdown, or supervise workers in cluster mode
//!
//! ## Example
//!
//! ```no_run
//! use kernel_runtime::{KernelBuilder, RawConfig, SharedValue, StartMode};
//! use serde_json::json;
//!
//! # async fn run() -> kernel_runtime::KernelResult<()> {
//! let raw = RawConfig::new()
//!     .with_host_url("http://localhost:3000/")
//!     .with_secret("keyboard-cat-secret");
//! let mut builder = KernelBuilder::new(raw)?;
//! builder.core(
//!     "sum",
//!     SharedValue::function(|args| {
//!         Ok(json!(args.iter().filter_map(|a| a.as_i64()).sum::<i64>()))
//!     }),
//! )?;
//! builder.use_plugin("status")?;
//!
//! let kernel = builder.start(StartMode::DefaultPort).await?;
//! kernel.run_until_signal().await
//! # }
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod kernel;
pub mod materializer;
pub mod models;
pub mod plugin;
pub mod ports;
pub mod registry;
pub mod shared;
pub mod supervisor;

pub use app::{AppSettings, Authenticator, KernelContext, RequestContext};
pub use config::{CacheLocation, EnvSource, KernelConfig, ProcessEnv, RawConfig};
pub use error::{KernelError, KernelResult};
pub use kernel::{Kernel, KernelBuilder, LifecycleState, StartMode};
pub use materializer::{MaterializePhase, Materialized, Materializer};
pub use models::{ModelDefinition, ModelHandle, ModelTable, MESSAGE_MODEL, USER_MODEL};
pub use plugin::{Plugin, PluginCatalog, PluginField, PluginLoader, PluginRef, PluginResolver};
pub use registry::{
    CatchAllFactory, ContributionCounts, ContributionKind, ContributionRegistry,
    ContributionSummary, CoreFactory, EnvironmentScope, MiddlewareFactory, MiddlewareOptions,
    ModelFactory, RoutesFn, SettingsFn, StrategyBundle, StrategyFn, StrategyRoutesFn,
};
pub use shared::{SharedAccessError, SharedCallError, SharedNamespaces, SharedValue, DEFAULT_NAMESPACE};
pub use supervisor::{
    ClusterOptions, ClusterRole, Coordinator, RestartStrategy, SupervisorError, SupervisorHandle,
};

pub use shared_bus::{EventFilter, InMemoryEventBus, KernelEvent, SharedEventBus};
