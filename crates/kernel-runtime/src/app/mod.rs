//! # Web Application Assembly
//!
//! Builds the axum [`Router`] and the [`AppSettings`] of a kernel from the
//! locked contribution registry.
//!
//! A request passes through, outermost first:
//!
//! ```text
//! RequestContextLayer → RequestEventLayer → AuthLayer (if strategies)
//!   → plugin middleware (registration order, path guarded)
//!   → routes → catch-all fallback
//! ```

mod auth;
mod context;
mod layers;
mod middleware;
mod settings;

pub use auth::Authenticator;
pub use context::KernelContext;
pub use layers::{AuthLayer, RequestContext, RequestContextLayer, RequestEventLayer};
pub use middleware::{
    guard, layer, middleware_fn, path_matches, route_layer, Endpoint, Middleware,
};
pub use settings::AppSettings;

use crate::error::{KernelError, KernelResult};
use crate::registry::{applies_to, ContributionRegistry};
use axum::extract::Request;
use axum::Router;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info};

/// Settings keys every app carries before plugin settings run.
pub const PORT_SETTING: &str = "port";
pub const ENV_SETTING: &str = "env";
pub const HOST_URL_SETTING: &str = "hostUrl";

/// Output of [`assemble`].
pub(crate) struct AssembledApp {
    pub settings: AppSettings,
    pub router: Router,
    pub authenticator: Authenticator,
}

/// Apply app settings, strategies, middleware, routes and the catch-all, in
/// that order, for the active environment.
pub(crate) fn assemble(
    registry: &ContributionRegistry,
    context: &KernelContext,
) -> KernelResult<AssembledApp> {
    let config = context.config();
    let environment = config.environment();

    let mut settings = AppSettings::new(environment);
    settings.set_default(PORT_SETTING, config.port());
    settings.set_default(ENV_SETTING, environment);
    settings.set_default(HOST_URL_SETTING, config.host_url());

    for entry in registry.app_setting_entries() {
        if applies_to(entry.environment.as_deref(), environment) {
            debug!(seq = entry.seq, "Applying app setting");
            entry.settings.apply(&mut settings, context);
        }
    }

    let mut authenticator = Authenticator::new();
    for entry in registry.strategy_entries() {
        let strategy = entry.strategy.build(context)?;
        info!(strategy = strategy.name(), owner = ?entry.owner, "Identity strategy enabled");
        authenticator.push(strategy);
    }

    let mut router = Router::new();
    for entry in registry.strategy_entries() {
        router = guarded_install(|| entry.routes.install(router, &authenticator, context))?;
    }
    for entry in registry.routes_entries() {
        debug!(seq = entry.seq, "Installing routes");
        router = guarded_install(|| entry.routes.install(router, context))?;
    }
    if let Some(entry) = registry.catch_all_entry() {
        let endpoint = entry.factory.produce(context);
        router = guarded_install(|| router.fallback(move |req: Request| endpoint(req)))?;
        debug!(seq = entry.seq, "Catch-all handler mounted");
    }

    let chain: Vec<Middleware> = registry
        .middleware_entries()
        .iter()
        .filter(|entry| applies_to(entry.environment.as_deref(), environment))
        .map(|entry| {
            info!(seq = entry.seq, path = %entry.path, "Middleware mounted");
            guard(entry.factory.produce(context), &entry.path)
        })
        .collect();
    // Layers added later run first.
    for middleware in chain.into_iter().rev() {
        router = layer(router, middleware);
    }

    if !authenticator.is_empty() {
        router = router.layer(AuthLayer::new(authenticator.clone()));
    }
    let router = router
        .layer(RequestEventLayer::new())
        .layer(RequestContextLayer::new(context.clone()));

    Ok(AssembledApp {
        settings,
        router,
        authenticator,
    })
}

/// Run a route installer, turning a router panic (duplicate or malformed
/// path) into [`KernelError::RouteConflict`].
fn guarded_install(install: impl FnOnce() -> Router) -> KernelResult<Router> {
    catch_unwind(AssertUnwindSafe(install))
        .map_err(|payload| KernelError::RouteConflict(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "route installer panicked".to_string()
    }
}
