//! Helpers shared by the kernel-runtime integration tests.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use kernel_runtime::{KernelBuilder, RawConfig};
use serde_json::Value;
use std::collections::HashMap;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Configuration that needs nothing from the process environment.
pub fn test_config(environment: &str) -> RawConfig {
    RawConfig::new()
        .with_host_url("http://localhost:3000/")
        .with_secret(TEST_SECRET)
        .with_data_store_url("memory://integration")
        .with_cache_url("memory://integration")
        .with_port(0)
        .with_environment(environment)
}

/// A builder isolated from the process environment.
pub fn builder(environment: &str) -> KernelBuilder {
    let env: HashMap<&str, &str> = HashMap::new();
    KernelBuilder::with_env(test_config(environment), &env).expect("Config should normalize")
}

/// Send `request` through `router` and decode the body as JSON (or
/// `Value::Null` when it is not JSON).
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("Router is infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Request should build")
}
