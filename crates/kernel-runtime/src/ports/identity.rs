//! Identity-provider port.

use super::ResourceError;
use async_trait::async_trait;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    /// Name of the strategy that authenticated this principal.
    pub strategy: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Credentials rejected by '{strategy}': {reason}")]
    Rejected { strategy: String, reason: String },

    #[error("Identity strategy unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// One identity-provider strategy.
///
/// `Ok(None)` means the request carries no credentials this strategy
/// understands; the next strategy is tried.
#[async_trait]
pub trait IdentityStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn authenticate(&self, parts: &Parts) -> Result<Option<Principal>, IdentityError>;
}
