//! Cache store port.

use super::ResourceError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// An open cache client.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn url(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>, ResourceError>;

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), ResourceError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, ResourceError>;

    /// Close the client. Closing twice is not an error.
    async fn close(&self) -> Result<(), ResourceError>;
}

/// Creates cache clients.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn CacheStore>, ResourceError>;
}
