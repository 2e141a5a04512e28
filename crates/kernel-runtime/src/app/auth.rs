//! Authentication over the registered identity strategies.

use super::layers::RequestContext;
use super::middleware::{middleware_fn, Middleware};
use crate::ports::{IdentityError, IdentityStrategy, Principal};
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// The identity strategies of a kernel, in registration order.
#[derive(Clone, Default)]
pub struct Authenticator {
    strategies: Vec<Arc<dyn IdentityStrategy>>,
}

impl Authenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, strategy: Arc<dyn IdentityStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy(&self, name: &str) -> Option<Arc<dyn IdentityStrategy>> {
        self.strategies.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.name())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order; the first principal wins. Strategy
    /// failures are logged and the next strategy is tried.
    pub async fn authenticate(&self, parts: &Parts) -> Option<Principal> {
        for strategy in &self.strategies {
            match strategy.authenticate(parts).await {
                Ok(Some(principal)) => {
                    debug!(strategy = strategy.name(), principal = %principal.id, "Request authenticated");
                    return Some(principal);
                }
                Ok(None) => {}
                Err(e) => warn!(strategy = strategy.name(), error = %e, "Authentication failed"),
            }
        }
        None
    }

    /// Run only the strategy called `name`.
    pub async fn authenticate_with(
        &self,
        name: &str,
        parts: &Parts,
    ) -> Result<Option<Principal>, IdentityError> {
        match self.strategy(name) {
            Some(strategy) => strategy.authenticate(parts).await,
            None => Err(IdentityError::Unavailable(name.to_string())),
        }
    }

    /// A middleware answering 401 unless strategy `name` authenticates the
    /// request.
    pub fn require(&self, name: &str) -> Middleware {
        let authenticator = self.clone();
        let name = Arc::<str>::from(name);
        middleware_fn(move |req: Request, next: Next| {
            let authenticator = authenticator.clone();
            let name = Arc::clone(&name);
            async move {
                let context = req.extensions().get::<RequestContext>().cloned();
                let already = context
                    .as_ref()
                    .and_then(RequestContext::principal)
                    .is_some_and(|p| p.strategy == *name);
                if already {
                    return next.run(req).await;
                }

                let (parts, body) = req.into_parts();
                match authenticator.authenticate_with(&name, &parts).await {
                    Ok(Some(principal)) => {
                        if let Some(context) = &context {
                            context.set_principal(principal);
                        }
                        next.run(Request::from_parts(parts, body)).await
                    }
                    Ok(None) => unauthorized(&name, "missing or unknown credentials"),
                    Err(e) => {
                        warn!(strategy = %name, error = %e, "Authentication rejected");
                        unauthorized(&name, &e.to_string())
                    }
                }
            }
        })
    }
}

fn unauthorized(strategy: &str, reason: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized", "strategy": strategy, "reason": reason })),
    )
        .into_response()
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
