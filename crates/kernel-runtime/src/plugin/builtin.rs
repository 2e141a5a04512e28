//! Plugins shipped with the runtime.

use super::Plugin;
use crate::adapters::{ApiKeyStrategy, API_KEY_STRATEGY};
use crate::app::{route_layer, RequestContext};
use crate::models::USER_MODEL;
use crate::ports::{IdentityError, IdentityStrategy};
use crate::registry::{CoreFactory, RoutesFn, StrategyBundle, StrategyFn, StrategyRoutesFn};
use crate::shared::SharedValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const STATUS_PLUGIN: &str = "status";
pub const API_KEY_PLUGIN: &str = "api-key";

/// `GET /status` plus a `status.started_at` core value (unix seconds).
pub fn status_plugin() -> Plugin {
    Plugin::new(STATUS_PLUGIN)
        .with_core(
            "started_at",
            CoreFactory::new(|_| {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                SharedValue::data(now)
            }),
        )
        .with_routes(RoutesFn::new(|router, context| {
            let started = Instant::now();
            let environment = context.config().environment().to_string();
            let host_url = context.config().host_url().to_string();
            router.route(
                "/status",
                get(move || {
                    let body = json!({
                        "environment": environment,
                        "pid": std::process::id(),
                        "uptimeSeconds": started.elapsed().as_secs(),
                        "hostUrl": host_url,
                    });
                    async move { Json(body) }
                }),
            )
        }))
}

/// Identity by `X-Api-Key` header against the `User` model, plus
/// `GET /api/whoami` guarded by that strategy.
pub fn api_key_plugin() -> Plugin {
    let strategy = StrategyFn::new(|context| {
        let users = context.model(USER_MODEL).ok_or_else(|| {
            IdentityError::Unavailable(format!("model '{USER_MODEL}' is not defined"))
        })?;
        Ok(Arc::new(ApiKeyStrategy::new(users)) as Arc<dyn IdentityStrategy>)
    });
    let routes = StrategyRoutesFn::new(|router, authenticator, _| {
        let guarded = route_layer(
            Router::new().route("/api/whoami", get(whoami)),
            authenticator.require(API_KEY_STRATEGY),
        );
        router.merge(guarded)
    });
    Plugin::new(API_KEY_PLUGIN).with_strategy(StrategyBundle::new(strategy, routes))
}

async fn whoami(Extension(context): Extension<RequestContext>) -> Response {
    match context.principal() {
        Some(principal) => Json(principal).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}
