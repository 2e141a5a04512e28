//! Request middleware and endpoint plumbing.

use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::Router;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A request middleware. It either answers the request itself or hands it
/// to `next`.
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// A terminal request handler.
pub type Endpoint = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req: Request, next: Next| -> BoxFuture<'static, Response> {
        Box::pin(f(req, next))
    })
}

/// Whether a middleware mounted at `mount` sees a request for `path`.
///
/// `/x` covers `/x` and `/x/...` but not `/xy`; `/` covers everything.
pub fn path_matches(mount: &str, path: &str) -> bool {
    let mount = mount.trim_end_matches('/');
    if mount.is_empty() {
        return true;
    }
    match path.strip_prefix(mount) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Restrict `middleware` to requests under `mount`; other requests pass
/// straight through.
pub fn guard(middleware: Middleware, mount: &str) -> Middleware {
    if mount.trim_end_matches('/').is_empty() {
        return middleware;
    }
    let mount = mount.to_string();
    Arc::new(move |req: Request, next: Next| -> BoxFuture<'static, Response> {
        if path_matches(&mount, req.uri().path()) {
            middleware(req, next)
        } else {
            Box::pin(next.run(req))
        }
    })
}

/// Wrap every route of `router` (fallback included) in `middleware`.
pub fn layer(router: Router, middleware: Middleware) -> Router {
    router.layer(from_fn(move |req: Request, next: Next| middleware(req, next)))
}

/// Wrap only the routes of `router` in `middleware`; unmatched requests do
/// not reach it.
pub fn route_layer(router: Router, middleware: Middleware) -> Router {
    router.route_layer(from_fn(move |req: Request, next: Next| middleware(req, next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn test_path_matches() {
        assert!(path_matches("/", "/anything"));
        assert!(path_matches("/x", "/x"));
        assert!(path_matches("/x", "/x/y"));
        assert!(path_matches("/x/", "/x/y"));
        assert!(!path_matches("/x", "/xy"));
        assert!(!path_matches("/x", "/"));
    }

    fn tag(value: &'static str) -> Middleware {
        middleware_fn(move |req, next: Next| async move {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .append("x-tag", HeaderValue::from_static(value));
            response
        })
    }

    async fn tags(router: Router, uri: &str) -> Vec<String> {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response
            .headers()
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_guarded_middleware_only_runs_under_mount() {
        let router = Router::new()
            .route("/api/items", get(|| async { "items" }))
            .route("/apix", get(|| async { "other" }));
        let router = layer(router, guard(tag("api"), "/api"));

        assert_eq!(tags(router.clone(), "/api/items").await, vec!["api"]);
        assert!(tags(router, "/apix").await.is_empty());
    }
}
