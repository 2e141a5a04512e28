//! Resolution, validation and registration of plugins.

use super::catalog::PluginResolver;
use super::compat::{self, CompatNotice};
use super::{
    Plugin, PluginField, PluginRef, APP_FIELD, CORE_FIELD, LISTENERS_FIELD, MIDDLEWARE_FIELD,
    MODEL_FIELD, ROUTES_FIELD, STRATEGY_FIELD,
};
use crate::error::{KernelError, KernelResult};
use crate::registry::ContributionRegistry;
use crate::shared::DEFAULT_NAMESPACE;
use std::sync::Arc;
use tracing::{debug, info};

/// Plugin names double as core namespaces: `[a-z0-9_-]+`, or the shared
/// namespace itself.
pub fn is_valid_plugin_name(name: &str) -> bool {
    name == DEFAULT_NAMESPACE
        || (!name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'))
}

/// Outcome of one successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub plugin: String,
    /// Registry entries added.
    pub contributions: usize,
    pub notices: Vec<CompatNotice>,
}

/// Loads plugins into a registry.
#[derive(Clone)]
pub struct PluginLoader {
    resolver: Arc<dyn PluginResolver>,
}

impl PluginLoader {
    pub fn new(resolver: Arc<dyn PluginResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolve(&self, plugin: PluginRef) -> KernelResult<Plugin> {
        match plugin {
            PluginRef::Value(plugin) => Ok(plugin),
            PluginRef::Named(name) => self
                .resolver
                .resolve(&name)
                .ok_or(KernelError::PluginNotFound(name)),
        }
    }

    /// Register every field of `plugin`. On error the registry is left as
    /// it was.
    pub fn load(
        &self,
        registry: &mut ContributionRegistry,
        plugin: impl Into<PluginRef>,
    ) -> KernelResult<LoadReport> {
        if registry.is_locked() {
            return Err(KernelError::AlreadyMaterialized);
        }
        let mut plugin = self.resolve(plugin.into())?;
        if !is_valid_plugin_name(plugin.name()) {
            return Err(KernelError::shape(
                plugin.name(),
                "name must consist of lowercase letters, digits, '_' or '-'",
            ));
        }

        let notices = compat::migrate(&mut plugin);
        validate(&plugin)?;

        let before = registry.counts().total();
        let mut staged = registry.snapshot();
        let (name, fields) = plugin.into_parts();
        for (field, value) in fields {
            apply(&mut staged, &name, &field, value)?;
        }
        *registry = staged;

        let contributions = registry.counts().total() - before;
        info!(plugin = %name, contributions, "Plugin loaded");
        Ok(LoadReport {
            plugin: name,
            contributions,
            notices,
        })
    }
}

fn expected_kind(field: &str) -> Option<&'static str> {
    [
        CORE_FIELD,
        MODEL_FIELD,
        STRATEGY_FIELD,
        APP_FIELD,
        MIDDLEWARE_FIELD,
        ROUTES_FIELD,
        LISTENERS_FIELD,
    ]
    .into_iter()
    .find(|kind| *kind == field)
}

fn validate(plugin: &Plugin) -> KernelResult<()> {
    let name = plugin.name();
    for (field, value) in plugin.fields() {
        let Some(expected) = expected_kind(field) else {
            continue;
        };
        if value.kind() != expected {
            return Err(KernelError::shape(
                name,
                format!("field '{field}' must be a {expected} contribution, found {}", value.kind()),
            ));
        }
        match value {
            PluginField::Strategy(bundle) if bundle.strategy.is_none() => {
                return Err(KernelError::shape(name, "strategy bundle has no strategy function"));
            }
            PluginField::Strategy(bundle) if bundle.routes.is_none() => {
                return Err(KernelError::shape(name, "strategy bundle has no routes function"));
            }
            PluginField::Core(map) if map.keys().any(String::is_empty) => {
                return Err(KernelError::shape(name, "core field names must be non-empty"));
            }
            PluginField::Model(map) if map.keys().any(String::is_empty) => {
                return Err(KernelError::shape(name, "model names must be non-empty"));
            }
            PluginField::Listeners(map) if map.keys().any(String::is_empty) => {
                return Err(KernelError::shape(name, "event names must be non-empty"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn apply(
    registry: &mut ContributionRegistry,
    plugin: &str,
    field: &str,
    value: PluginField,
) -> KernelResult<()> {
    if expected_kind(field).is_none() {
        debug!(plugin, field, "Skipping unknown plugin field");
        return Ok(());
    }
    match value {
        PluginField::Core(map) => {
            for (name, factory) in map {
                registry.register_core_in(plugin, name, factory)?;
            }
        }
        PluginField::Model(map) => {
            for (name, factory) in map {
                registry.register_model(name, factory)?;
            }
        }
        PluginField::Strategy(bundle) => {
            registry.register_auth_strategy_for(plugin, bundle)?;
        }
        PluginField::App(settings) => {
            registry.register_app_setting_fn(settings)?;
        }
        PluginField::Middleware(list) => {
            for factory in list {
                registry.register_middleware_fn(factory)?;
            }
        }
        PluginField::Routes(routes) => {
            registry.register_routes(routes)?;
        }
        PluginField::Listeners(map) => {
            for (event, listener) in map {
                registry.register_listener(event, listener)?;
            }
        }
    }
    Ok(())
}
