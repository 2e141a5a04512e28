//! # Plugin Loader
//!
//! A plugin is a named bundle of contribution fields. Loading one resolves
//! it (by value or by name), migrates legacy field names, validates every
//! field, and forwards the fields to the registry in declaration order.
//! Either every contribution of a plugin is registered or none is.

mod builtin;
mod catalog;
pub mod compat;
mod loader;

pub use builtin::{api_key_plugin, status_plugin, API_KEY_PLUGIN, STATUS_PLUGIN};
pub use catalog::{PluginCatalog, PluginResolver};
pub use compat::CompatNotice;
pub use loader::{is_valid_plugin_name, LoadReport, PluginLoader};

use crate::registry::{
    CoreFactory, MiddlewareFactory, ModelFactory, RoutesFn, SettingsFn, StrategyBundle,
};
use indexmap::IndexMap;
use shared_bus::Listener;
use std::fmt;

pub const CORE_FIELD: &str = "core";
pub const MODEL_FIELD: &str = "model";
pub const STRATEGY_FIELD: &str = "strategy";
pub const APP_FIELD: &str = "app";
pub const MIDDLEWARE_FIELD: &str = "middleware";
pub const ROUTES_FIELD: &str = "routes";
pub const LISTENERS_FIELD: &str = "listeners";

/// The value of one plugin field.
#[derive(Clone)]
pub enum PluginField {
    Core(IndexMap<String, CoreFactory>),
    Model(IndexMap<String, ModelFactory>),
    Strategy(StrategyBundle),
    App(SettingsFn),
    Middleware(Vec<MiddlewareFactory>),
    Routes(RoutesFn),
    Listeners(IndexMap<String, Listener>),
}

impl PluginField {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(_) => CORE_FIELD,
            Self::Model(_) => MODEL_FIELD,
            Self::Strategy(_) => STRATEGY_FIELD,
            Self::App(_) => APP_FIELD,
            Self::Middleware(_) => MIDDLEWARE_FIELD,
            Self::Routes(_) => ROUTES_FIELD,
            Self::Listeners(_) => LISTENERS_FIELD,
        }
    }
}

impl fmt::Debug for PluginField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(map) => f.debug_tuple("Core").field(&map.keys().collect::<Vec<_>>()).finish(),
            Self::Model(map) => f.debug_tuple("Model").field(&map.keys().collect::<Vec<_>>()).finish(),
            Self::Listeners(map) => f
                .debug_tuple("Listeners")
                .field(&map.keys().collect::<Vec<_>>())
                .finish(),
            Self::Middleware(list) => f.debug_tuple("Middleware").field(&list.len()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// A named set of contribution fields.
#[derive(Clone, Debug)]
pub struct Plugin {
    name: String,
    fields: IndexMap<String, PluginField>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &PluginField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field(&self, name: &str) -> Option<&PluginField> {
        self.fields.get(name)
    }

    pub(crate) fn fields_mut(&mut self) -> &mut IndexMap<String, PluginField> {
        &mut self.fields
    }

    pub(crate) fn into_parts(self) -> (String, IndexMap<String, PluginField>) {
        (self.name, self.fields)
    }

    /// Set a field under any name, replacing a previous value.
    pub fn with_field(mut self, name: impl Into<String>, field: PluginField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn with_core(mut self, field: impl Into<String>, value: impl Into<CoreFactory>) -> Self {
        let entry = self
            .fields
            .entry(CORE_FIELD.to_string())
            .or_insert_with(|| PluginField::Core(IndexMap::new()));
        if let PluginField::Core(map) = entry {
            map.insert(field.into(), value.into());
        }
        self
    }

    pub fn with_model(mut self, name: impl Into<String>, factory: ModelFactory) -> Self {
        let entry = self
            .fields
            .entry(MODEL_FIELD.to_string())
            .or_insert_with(|| PluginField::Model(IndexMap::new()));
        if let PluginField::Model(map) = entry {
            map.insert(name.into(), factory);
        }
        self
    }

    pub fn with_strategy(self, bundle: StrategyBundle) -> Self {
        self.with_field(STRATEGY_FIELD, PluginField::Strategy(bundle))
    }

    pub fn with_app(self, settings: SettingsFn) -> Self {
        self.with_field(APP_FIELD, PluginField::App(settings))
    }

    /// Append a middleware; a plugin may carry several.
    pub fn with_middleware(mut self, factory: MiddlewareFactory) -> Self {
        let entry = self
            .fields
            .entry(MIDDLEWARE_FIELD.to_string())
            .or_insert_with(|| PluginField::Middleware(Vec::new()));
        if let PluginField::Middleware(list) = entry {
            list.push(factory);
        }
        self
    }

    pub fn with_routes(self, routes: RoutesFn) -> Self {
        self.with_field(ROUTES_FIELD, PluginField::Routes(routes))
    }

    pub fn with_listener(mut self, event: impl Into<String>, listener: Listener) -> Self {
        let entry = self
            .fields
            .entry(LISTENERS_FIELD.to_string())
            .or_insert_with(|| PluginField::Listeners(IndexMap::new()));
        if let PluginField::Listeners(map) = entry {
            map.insert(event.into(), listener);
        }
        self
    }
}

/// A plugin given directly or by name.
#[derive(Debug, Clone)]
pub enum PluginRef {
    Value(Plugin),
    Named(String),
}

impl From<Plugin> for PluginRef {
    fn from(plugin: Plugin) -> Self {
        Self::Value(plugin)
    }
}

impl From<&str> for PluginRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for PluginRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}
