//! In-memory document store.

use crate::models::{ModelDefinition, ModelHandle};
use crate::ports::{DataStore, DataStoreConnector, ResourceError};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type Collections = Arc<RwLock<HashMap<String, Vec<Value>>>>;

/// Document store holding every collection in a map.
pub struct MemoryDataStore {
    url: String,
    collections: Collections,
    closed: Arc<AtomicBool>,
}

impl MemoryDataStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collections: Arc::default(),
            closed: Arc::default(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    fn url(&self) -> &str {
        &self.url
    }

    fn define_model(
        &self,
        definition: ModelDefinition,
    ) -> Result<Arc<dyn ModelHandle>, ResourceError> {
        if self.is_closed() {
            return Err(ResourceError::Closed("data store"));
        }
        debug!(model = %definition.name, collection = %definition.collection, "Model defined");
        self.collections
            .write()
            .entry(definition.collection.clone())
            .or_default();
        Ok(Arc::new(MemoryModel {
            definition,
            collections: Arc::clone(&self.collections),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryModel {
    definition: ModelDefinition,
    collections: Collections,
    closed: Arc<AtomicBool>,
}

impl MemoryModel {
    fn ensure_open(&self) -> Result<(), ResourceError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ResourceError::Closed("data store"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModelHandle for MemoryModel {
    fn definition(&self) -> &ModelDefinition {
        &self.definition
    }

    async fn insert(&self, mut document: Value) -> Result<String, ResourceError> {
        self.ensure_open()?;
        let Some(fields) = document.as_object_mut() else {
            return Err(ResourceError::Model {
                model: self.definition.name.clone(),
                reason: "documents must be JSON objects".into(),
            });
        };
        let id = match fields.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                fields.insert("_id".into(), Value::String(id.clone()));
                id
            }
        };
        self.collections
            .write()
            .entry(self.definition.collection.clone())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn find_one(&self, field: &str, value: &Value) -> Result<Option<Value>, ResourceError> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(&self.definition.collection)
            .and_then(|docs| docs.iter().find(|doc| doc.get(field) == Some(value)).cloned()))
    }

    async fn count(&self) -> Result<usize, ResourceError> {
        self.ensure_open()?;
        Ok(self
            .collections
            .read()
            .get(&self.definition.collection)
            .map_or(0, Vec::len))
    }
}

/// Connector handing out [`MemoryDataStore`]s for any accepted URL.
#[derive(Default)]
pub struct MemoryDataStoreConnector {
    connections: AtomicUsize,
}

impl MemoryDataStoreConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataStoreConnector for MemoryDataStoreConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DataStore>, ResourceError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        debug!(url, "In-memory data store opened");
        Ok(Arc::new(MemoryDataStore::new(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_assigns_id_and_finds() {
        let store = MemoryDataStore::new("memory://");
        let users = store
            .define_model(ModelDefinition::new("User", "users"))
            .unwrap();

        let id = users
            .insert(json!({"username": "john", "apiKey": "k1"}))
            .await
            .unwrap();
        let found = users.find_one("apiKey", &json!("k1")).await.unwrap().unwrap();

        assert_eq!(found["_id"], json!(id));
        assert_eq!(found["username"], "john");
        assert!(users.find_one("apiKey", &json!("k2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_object_documents_rejected() {
        let store = MemoryDataStore::new("memory://");
        let users = store
            .define_model(ModelDefinition::new("User", "users"))
            .unwrap();

        assert!(matches!(
            users.insert(json!([1, 2])).await,
            Err(ResourceError::Model { .. })
        ));
    }

    #[tokio::test]
    async fn test_closed_store_refuses_work() {
        let store = MemoryDataStore::new("memory://");
        let users = store
            .define_model(ModelDefinition::new("User", "users"))
            .unwrap();

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(store.is_closed());
        assert_eq!(users.count().await, Err(ResourceError::Closed("data store")));
        assert!(store
            .define_model(ModelDefinition::new("Other", "others"))
            .is_err());
    }

    #[tokio::test]
    async fn test_connector_counts_connections() {
        let connector = MemoryDataStoreConnector::new();
        let store = connector.connect("mongodb://localhost/test").await.unwrap();

        assert_eq!(store.url(), "mongodb://localhost/test");
        assert_eq!(connector.connections(), 1);
    }
}
