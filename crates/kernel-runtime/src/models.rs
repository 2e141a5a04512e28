//! # Model Table
//!
//! Model handles by name. `User` and `Message` are built in and reserved;
//! contributions may add models but never redefine those two.

use crate::error::{KernelError, KernelResult};
use crate::ports::{DataStore, ResourceError};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const USER_MODEL: &str = "User";
pub const MESSAGE_MODEL: &str = "Message";

/// Names no contribution may register, singular and plural.
pub const RESERVED_MODEL_NAMES: &[&str] = &["User", "Users", "Message", "Messages"];

pub fn is_reserved_model_name(name: &str) -> bool {
    RESERVED_MODEL_NAMES.contains(&name)
}

/// What a data store needs to know to define a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinition {
    pub name: String,
    pub collection: String,
    pub indexes: Vec<String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }
}

/// Definitions of the reserved models.
pub fn builtin_definitions() -> Vec<ModelDefinition> {
    vec![
        ModelDefinition::new(USER_MODEL, "users")
            .with_index("username")
            .with_index("email")
            .with_index("apiKey"),
        ModelDefinition::new(MESSAGE_MODEL, "messages")
            .with_index("to")
            .with_index("from")
            .with_index("createdAt"),
    ]
}

/// A defined model.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    fn definition(&self) -> &ModelDefinition;

    /// Store a document, returning its id.
    async fn insert(&self, document: Value) -> Result<String, ResourceError>;

    /// First document whose `field` equals `value`.
    async fn find_one(&self, field: &str, value: &Value) -> Result<Option<Value>, ResourceError>;

    async fn count(&self) -> Result<usize, ResourceError>;
}

/// Model handles by name.
#[derive(Clone, Default)]
pub struct ModelTable {
    models: IndexMap<String, Arc<dyn ModelHandle>>,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the reserved models, defined on `data_store`.
    pub fn with_builtins(data_store: &dyn DataStore) -> KernelResult<Self> {
        let mut table = Self::new();
        for definition in builtin_definitions() {
            let name = definition.name.clone();
            let handle = data_store.define_model(definition)?;
            table.models.insert(name, handle);
        }
        Ok(table)
    }

    /// Add a contributed model. Existing names, reserved ones included,
    /// are refused.
    pub fn insert(&mut self, name: &str, handle: Arc<dyn ModelHandle>) -> KernelResult<()> {
        if is_reserved_model_name(name) || self.models.contains_key(name) {
            return Err(KernelError::ReservedName(name.to_string()));
        }
        self.models.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelHandle>> {
        self.models.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl fmt::Debug for ModelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.models.keys()).finish()
    }
}
