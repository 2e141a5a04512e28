//! Plugin loading integration tests
//!
//! Load plugins into a builder by value and by name, then check what the
//! materialized kernel ends up with.

mod common;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Request as HttpRequest, StatusCode};
use axum::middleware::Next;
use axum::routing::get;
use common::{builder, get as get_request, send};
use kernel_runtime::plugin::{PluginField, LISTENERS_FIELD};
use kernel_runtime::{
    ContributionKind, CoreFactory, KernelError, MiddlewareFactory, MiddlewareOptions,
    ModelDefinition, ModelFactory, ModelHandle, Plugin, PluginCatalog, RoutesFn, SettingsFn,
    SharedValue, StartMode, USER_MODEL,
};
use parking_lot::Mutex;
use serde_json::json;
use shared_bus::STARTED_EVENT;
use std::sync::Arc;

fn notes_plugin() -> Plugin {
    Plugin::new("notes")
        .with_core("limit", SharedValue::data(25))
        .with_model(
            "Note",
            ModelFactory::definition(ModelDefinition::new("Note", "notes").with_index("owner")),
        )
        .with_app(SettingsFn::new(|settings, _| {
            settings.set("notes.enabled", true);
        }))
        .with_routes(RoutesFn::new(|router, _| {
            router.route("/notes", get(|| async { "notes" }))
        }))
}

#[tokio::test]
async fn test_plugin_contributions_are_materialized() {
    let mut builder = builder("development");
    let report = builder.use_plugin(notes_plugin()).unwrap();

    assert_eq!(report.plugin, "notes");
    assert_eq!(report.contributions, 4);
    assert!(report.notices.is_empty());

    let mut kernel = builder.start(StartMode::Headless).await.unwrap();
    assert_eq!(kernel.shared().data("notes", "limit").unwrap(), &json!(25));
    assert!(kernel.models().contains("Note"));
    assert_eq!(kernel.app().get("notes.enabled"), Some(&json!(true)));

    let (status, _) = send(kernel.router(), get_request("/notes")).await;
    assert_eq!(status, StatusCode::OK);
    kernel.shutdown().await.unwrap();
}

#[test]
fn test_loading_a_plugin_matches_direct_registration() {
    let mut loaded = builder("development");
    loaded.use_plugin(notes_plugin()).unwrap();

    let mut direct = builder("development");
    direct
        .core_in("notes", "limit", SharedValue::data(25))
        .unwrap()
        .model(
            "Note",
            ModelFactory::definition(ModelDefinition::new("Note", "notes")),
        )
        .unwrap()
        .app_setting(Default::default(), |settings, _| {
            settings.set("notes.enabled", true);
        })
        .unwrap()
        .routes(|router, _| router)
        .unwrap();

    assert_eq!(loaded.registry().summaries(), direct.registry().summaries());
    assert_eq!(loaded.registry().counts(), direct.registry().counts());
}

#[test]
fn test_shared_plugin_contributes_to_default_namespace() {
    let mut builder = builder("development");
    builder
        .use_plugin(Plugin::new("shared").with_core("answer", SharedValue::data(42)))
        .unwrap();

    let summary = &builder.registry().summaries()[0];
    assert_eq!(summary.kind, ContributionKind::CoreExtension);
    assert_eq!(summary.namespace.as_deref(), Some("shared"));
    assert_eq!(summary.key.as_deref(), Some("answer"));
}

#[tokio::test]
async fn test_legacy_field_names_still_load() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listeners = indexmap::IndexMap::from([(
        STARTED_EVENT.to_string(),
        Arc::new(move |event: &kernel_runtime::KernelEvent| {
            sink.lock().push(event.payload.clone());
        }) as shared_bus::Listener,
    )]);
    let plugin = Plugin::new("legacy").with_field("events", PluginField::Listeners(listeners));

    let mut builder = builder("development");
    let report = builder.use_plugin(plugin).unwrap();

    assert_eq!(report.notices.len(), 1);
    assert_eq!(report.notices[0].alias, "events");
    assert_eq!(report.notices[0].canonical, LISTENERS_FIELD);
    assert!(!report.notices[0].dropped);

    let mut kernel = builder.start(StartMode::Headless).await.unwrap();
    assert_eq!(seen.lock().as_slice(), &[json!({"type": "app"})]);
    kernel.shutdown().await.unwrap();
}

#[test]
fn test_failed_plugin_leaves_registry_untouched() {
    let mut builder = builder("development");
    builder.core("answer", SharedValue::data(42)).unwrap();
    let before = builder.registry().summaries();

    // The reserved model name is refused after the core field was staged.
    let plugin = Plugin::new("broken")
        .with_core("limit", SharedValue::data(1))
        .with_model(
            USER_MODEL,
            ModelFactory::definition(ModelDefinition::new(USER_MODEL, "people")),
        );
    let err = builder.use_plugin(plugin).unwrap_err();

    assert!(matches!(err, KernelError::ReservedName(ref name) if name == USER_MODEL));
    assert_eq!(builder.registry().summaries(), before);
}

#[test]
fn test_wrong_field_kind_is_a_shape_error() {
    let mut builder = builder("development");
    let plugin = Plugin::new("confused").with_field(
        "routes",
        PluginField::App(SettingsFn::new(|_, _| {})),
    );

    let err = builder.use_plugin(plugin).unwrap_err();
    assert!(matches!(err, KernelError::PluginShape { ref plugin, .. } if plugin == "confused"));
    assert_eq!(builder.registry().counts().total(), 0);
}

#[test]
fn test_bad_plugin_names() {
    let mut builder = builder("development");
    for name in ["", "Has Space", "UPPER", "dots.in.name"] {
        let err = builder.use_plugin(Plugin::new(name)).unwrap_err();
        assert!(matches!(err, KernelError::PluginShape { .. }), "{name:?} accepted");
    }
    assert!(matches!(
        builder.use_plugin("no-such-plugin").unwrap_err(),
        KernelError::PluginNotFound(ref name) if name == "no-such-plugin"
    ));
}

#[test]
fn test_relative_middleware_path_is_rejected() {
    let mut builder = builder("development");
    let before = builder.registry().counts();

    let err = builder
        .middleware(MiddlewareOptions::at("x"), |request: Request, next: Next| {
            next.run(request)
        })
        .unwrap_err();

    assert!(matches!(err, KernelError::Path(ref path) if path == "x"));
    assert_eq!(builder.registry().counts(), before);
}

#[tokio::test]
async fn test_plugin_middleware_wraps_plugin_routes() {
    let hits = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&hits);
    let plugin = Plugin::new("audited")
        .with_middleware(MiddlewareFactory::from_fn(move |request: Request, next: Next| {
            *counter.lock() += 1;
            next.run(request)
        }))
        .with_routes(RoutesFn::new(|router, _| {
            router.route("/audited", get(|| async { "ok" }))
        }));

    let mut builder = builder("development");
    builder.use_plugin(plugin).unwrap();
    let mut kernel = builder.start(StartMode::Headless).await.unwrap();

    send(kernel.router(), get_request("/audited")).await;
    send(kernel.router(), get_request("/missing")).await;

    assert_eq!(*hits.lock(), 2);
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_named_plugins_from_custom_catalog() {
    let mut catalog = PluginCatalog::with_builtins();
    catalog.register("greeting", || {
        Plugin::new("greeting").with_core(
            "greet",
            CoreFactory::constant(SharedValue::function(|args| {
                let name = args.first().and_then(|v| v.as_str()).unwrap_or("world");
                Ok(json!(format!("hello {name}")))
            })),
        )
    });

    let mut builder = builder("development").with_resolver(Arc::new(catalog));
    builder.use_plugin("greeting").unwrap();
    let mut kernel = builder.start(StartMode::Headless).await.unwrap();

    assert_eq!(
        kernel.shared().call("greeting", "greet", &[json!("kernel")]).unwrap(),
        json!("hello kernel")
    );
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status_plugin_reports_environment() {
    let mut builder = builder("staging");
    builder.use_plugin("status").unwrap();
    let mut kernel = builder.start(StartMode::Headless).await.unwrap();

    let (status, body) = send(kernel.router(), get_request("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["environment"], json!("staging"));
    assert_eq!(body["pid"], json!(std::process::id()));
    assert!(kernel.shared().data("status", "started_at").is_ok());
    kernel.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_api_key_plugin_guards_whoami() {
    let mut builder = builder("development");
    builder.use_plugin("api-key").unwrap();
    let mut kernel = builder.start(StartMode::Headless).await.unwrap();

    let users = kernel.models().get(USER_MODEL).expect("User model is built in");
    users
        .insert(json!({"_id": "u1", "username": "john", "apiKey": "k-123"}))
        .await
        .unwrap();
    assert_eq!(kernel.authenticator().names().collect::<Vec<_>>(), ["api-key"]);

    let (status, body) = send(kernel.router(), get_request("/api/whoami")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["strategy"], json!("api-key"));

    let request = HttpRequest::builder()
        .uri("/api/whoami")
        .header("x-api-key", "k-123")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(kernel.router(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!("u1"));
    assert_eq!(body["strategy"], json!("api-key"));

    let request = HttpRequest::builder()
        .uri("/api/whoami")
        .header("x-api-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(kernel.router(), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    kernel.shutdown().await.unwrap();
}
