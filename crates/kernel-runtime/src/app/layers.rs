//! Tower layers wrapped around every request of the assembled app.
//!
//! Outermost first: [`RequestContextLayer`] stores a [`RequestContext`] in
//! the request extensions, [`RequestEventLayer`] opens the request span and
//! emits the `http` event, [`AuthLayer`] resolves the principal.

use super::auth::Authenticator;
use super::context::KernelContext;
use crate::models::ModelHandle;
use crate::ports::Principal;
use axum::{body::Body, http::Request, response::Response};
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_bus::HTTP_EVENT;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

type BoxedResponse<E> = Pin<Box<dyn Future<Output = Result<Response, E>> + Send>>;

/// Per-request view of the kernel. Handlers extract it with
/// `Extension<RequestContext>`.
#[derive(Clone)]
pub struct RequestContext {
    kernel: KernelContext,
    request_id: Uuid,
    principal: Arc<RwLock<Option<Principal>>>,
}

impl RequestContext {
    pub fn new(kernel: KernelContext) -> Self {
        Self {
            kernel,
            request_id: Uuid::new_v4(),
            principal: Arc::new(RwLock::new(None)),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn kernel(&self) -> &KernelContext {
        &self.kernel
    }

    pub fn model(&self, name: &str) -> Option<Arc<dyn ModelHandle>> {
        self.kernel.model(name)
    }

    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.kernel.emit(name, payload)
    }

    /// The authenticated caller, if any strategy recognized the request.
    pub fn principal(&self) -> Option<Principal> {
        self.principal.read().clone()
    }

    pub fn set_principal(&self, principal: Principal) {
        *self.principal.write() = Some(principal);
    }
}

/// Installs a fresh [`RequestContext`] on each request.
#[derive(Clone)]
pub struct RequestContextLayer {
    kernel: KernelContext,
}

impl RequestContextLayer {
    pub fn new(kernel: KernelContext) -> Self {
        Self { kernel }
    }
}

impl<S> Layer<S> for RequestContextLayer {
    type Service = RequestContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestContextService {
            inner,
            kernel: self.kernel.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequestContextService<S> {
    inner: S,
    kernel: KernelContext,
}

impl<S> Service<Request<Body>> for RequestContextService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        req.extensions_mut()
            .insert(RequestContext::new(self.kernel.clone()));
        self.inner.call(req)
    }
}

/// Opens the `kernel_request` span and emits an `http` event once the
/// response is ready.
#[derive(Clone, Default)]
pub struct RequestEventLayer;

impl RequestEventLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestEventLayer {
    type Service = RequestEventService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestEventService { inner }
    }
}

#[derive(Clone)]
pub struct RequestEventService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestEventService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxedResponse<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let method = req.method().clone();
        let uri = req.uri().clone();
        let context = req.extensions().get::<RequestContext>().cloned();

        let span = info_span!(
            "kernel_request",
            http.method = %method,
            http.target = %uri.path(),
            request_id = tracing::field::Empty,
            http.status = tracing::field::Empty,
        );
        if let Some(context) = &context {
            span.record("request_id", tracing::field::display(context.request_id()));
        }

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(req).await;

                if let Ok(response) = &result {
                    let status = response.status().as_u16();
                    Span::current().record("http.status", status);

                    if let Some(context) = context {
                        let principal = context.principal().map(|p| p.id);
                        context.emit(
                            HTTP_EVENT,
                            json!({
                                "method": method.as_str(),
                                "uri": uri.to_string(),
                                "status": status,
                                "durationMs": started.elapsed().as_millis() as u64,
                                "principal": principal,
                            }),
                        );
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

/// Runs the [`Authenticator`] and stores the principal it finds.
#[derive(Clone)]
pub struct AuthLayer {
    authenticator: Authenticator,
}

impl AuthLayer {
    pub fn new(authenticator: Authenticator) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Authenticator,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxedResponse<S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let authenticator = self.authenticator.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            if let Some(principal) = authenticator.authenticate(&parts).await {
                if let Some(context) = parts.extensions.get::<RequestContext>() {
                    context.set_principal(principal);
                }
            }
            inner.call(Request::from_parts(parts, body)).await
        })
    }
}
