//! # Kernel
//!
//! A materialized, running kernel instance: the product of
//! [`KernelBuilder::start`].
//!
//! ## Shutdown sequence
//!
//! 1. Emit `stopping`
//! 2. Stop the HTTP listener gracefully
//! 3. Run shutdown hooks in registration order
//! 4. Close the data store, then every cache client
//!
//! Every step runs even when an earlier one fails; the first error is
//! returned.

mod builder;
mod lifecycle;

pub use builder::KernelBuilder;
pub use lifecycle::{LifecycleState, StartMode};

use crate::app::{AppSettings, Authenticator, KernelContext, PORT_SETTING};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::materializer::Materialized;
use crate::models::ModelTable;
use crate::ports::{CacheConnector, CacheStore, DataStore};
use crate::shared::SharedNamespaces;
use axum::Router;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use shared_bus::{SharedEventBus, STARTED_EVENT, STOPPING_EVENT};
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, KernelResult<()>> + Send>;

struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// A running kernel.
pub struct Kernel {
    state: LifecycleState,
    mode: StartMode,
    context: KernelContext,
    settings: AppSettings,
    router: Router,
    authenticator: Authenticator,
    local_addr: Option<SocketAddr>,
    server: Option<ServerHandle>,
    hooks: Vec<ShutdownHook>,
    caches: Arc<dyn CacheConnector>,
    extra_caches: Vec<Arc<dyn CacheStore>>,
}

impl Kernel {
    /// Bind (unless headless) and announce `started`.
    pub(crate) async fn launch(
        materialized: Materialized,
        mode: StartMode,
        caches: Arc<dyn CacheConnector>,
    ) -> KernelResult<Self> {
        let Materialized {
            context,
            settings,
            router,
            authenticator,
        } = materialized;

        let mut kernel = Self {
            state: LifecycleState::Materializing,
            mode,
            context,
            settings,
            router,
            authenticator,
            local_addr: None,
            server: None,
            hooks: Vec::new(),
            caches,
            extra_caches: Vec::new(),
        };

        let payload = match mode.resolve_port(kernel.configured_port()) {
            None => json!({ "type": "app" }),
            Some(port) => match kernel.serve(port).await {
                Ok(addr) => json!({ "type": "http", "port": addr.port() }),
                Err(e) => {
                    kernel.release_resources().await;
                    kernel.state.advance(LifecycleState::Stopped)?;
                    return Err(e);
                }
            },
        };

        kernel.state.advance(LifecycleState::Running)?;
        info!(
            mode = %mode,
            environment = %kernel.config().environment(),
            addr = ?kernel.local_addr,
            "Kernel started"
        );
        kernel.emit(STARTED_EVENT, payload);
        Ok(kernel)
    }

    async fn serve(&mut self, port: u16) -> KernelResult<SocketAddr> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| KernelError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| KernelError::Bind { addr, source })?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, "HTTP listener bound");
        self.local_addr = Some(local_addr);
        self.server = Some(ServerHandle { shutdown, task });
        Ok(local_addr)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn mode(&self) -> StartMode {
        self.mode
    }

    pub fn config(&self) -> &KernelConfig {
        self.context.config()
    }

    pub fn shared(&self) -> &SharedNamespaces {
        self.context.shared()
    }

    pub fn models(&self) -> &ModelTable {
        self.context.models()
    }

    pub fn events(&self) -> &SharedEventBus {
        self.context.events()
    }

    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.context.emit(name, payload)
    }

    /// The application settings for the active environment.
    pub fn app(&self) -> &AppSettings {
        &self.settings
    }

    /// Port the default start mode binds: the app `port` setting, which
    /// plugins may override, else the configured port.
    fn configured_port(&self) -> u16 {
        self.settings
            .get(PORT_SETTING)
            .and_then(Value::as_u64)
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or_else(|| self.config().port())
    }

    /// The assembled application, for in-process dispatch.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    /// The bound address; `None` when headless.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.context.cache()
    }

    pub fn data_store(&self) -> Arc<dyn DataStore> {
        self.context.data_store()
    }

    pub fn context(&self) -> &KernelContext {
        &self.context
    }

    /// Open an additional cache client on the configured cache. It is closed
    /// with the kernel.
    pub async fn create_cache_client(&mut self) -> KernelResult<Arc<dyn CacheStore>> {
        let client = self.caches.connect(self.config().cache_url()).await?;
        self.extra_caches.push(Arc::clone(&client));
        Ok(client)
    }

    /// Run `hook` during shutdown, after the listener stopped and before
    /// connections close.
    pub fn add_shutdown_hook<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = KernelResult<()>> + Send + 'static,
    {
        self.hooks.push(Box::new(move || -> BoxFuture<'static, KernelResult<()>> {
            Box::pin(hook())
        }));
    }

    /// Tear the kernel down. Calling it again after it finished is a no-op.
    pub async fn shutdown(&mut self) -> KernelResult<()> {
        if self.state == LifecycleState::Stopped {
            return Ok(());
        }
        self.state.advance(LifecycleState::ShuttingDown)?;
        info!("Kernel shutting down");
        self.emit(STOPPING_EVENT, json!({}));

        let mut first_error: Option<KernelError> = None;
        let mut record = |result: KernelResult<()>| {
            if let Err(e) = result {
                error!(error = %e, "Shutdown step failed");
                first_error.get_or_insert(e);
            }
        };

        if let Some(server) = self.server.take() {
            let _ = server.shutdown.send(());
            let result = match server.task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(KernelError::Server(e.to_string())),
                Err(e) => Err(KernelError::Server(e.to_string())),
            };
            record(result);
        }

        for hook in self.hooks.drain(..) {
            record(hook().await);
        }

        record(self.context.data_store().close().await.map_err(Into::into));
        record(self.context.cache().close().await.map_err(Into::into));
        for client in self.extra_caches.drain(..) {
            record(client.close().await.map_err(Into::into));
        }

        self.state.advance(LifecycleState::Stopped)?;
        info!("Kernel stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for Ctrl-C, then shut down.
    pub async fn run_until_signal(mut self) -> KernelResult<()> {
        info!("Kernel is running. Press Ctrl+C to stop.");
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for the interrupt signal");
        }
        self.shutdown().await
    }

    async fn release_resources(&mut self) {
        if let Err(e) = self.context.data_store().close().await {
            warn!(error = %e, "Failed to close data store");
        }
        if let Err(e) = self.context.cache().close().await {
            warn!(error = %e, "Failed to close cache store");
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("state", &self.state)
            .field("mode", &self.mode)
            .field("local_addr", &self.local_addr)
            .field("context", &self.context)
            .finish()
    }
}
