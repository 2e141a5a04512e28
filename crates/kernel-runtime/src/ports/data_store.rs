//! Document store port.

use super::ResourceError;
use crate::models::{ModelDefinition, ModelHandle};
use async_trait::async_trait;
use std::sync::Arc;

/// An open data-store connection.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// The URL this connection was opened with.
    fn url(&self) -> &str;

    /// Define a model. Called once per model during materialization.
    fn define_model(&self, definition: ModelDefinition)
        -> Result<Arc<dyn ModelHandle>, ResourceError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), ResourceError>;
}

/// Opens data-store connections.
#[async_trait]
pub trait DataStoreConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn DataStore>, ResourceError>;
}
