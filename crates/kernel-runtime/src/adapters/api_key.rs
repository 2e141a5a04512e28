//! API key identity strategy.

use crate::models::ModelHandle;
use crate::ports::{IdentityError, IdentityStrategy, Principal};
use async_trait::async_trait;
use axum::http::request::Parts;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_STRATEGY: &str = "api-key";

/// Authenticates requests carrying an `X-Api-Key` header by looking the key
/// up in the user model's `apiKey` field.
pub struct ApiKeyStrategy {
    users: Arc<dyn ModelHandle>,
}

impl ApiKeyStrategy {
    pub fn new(users: Arc<dyn ModelHandle>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl IdentityStrategy for ApiKeyStrategy {
    fn name(&self) -> &str {
        API_KEY_STRATEGY
    }

    async fn authenticate(&self, parts: &Parts) -> Result<Option<Principal>, IdentityError> {
        let Some(header) = parts.headers.get(API_KEY_HEADER) else {
            return Ok(None);
        };
        let key = header.to_str().map_err(|_| IdentityError::Rejected {
            strategy: API_KEY_STRATEGY.into(),
            reason: "header is not valid ASCII".into(),
        })?;

        let Some(user) = self
            .users
            .find_one("apiKey", &Value::String(key.to_string()))
            .await?
        else {
            debug!("Unknown API key presented");
            return Ok(None);
        };

        let id = user
            .get("_id")
            .or_else(|| user.get("username"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Some(Principal {
            id,
            strategy: API_KEY_STRATEGY.into(),
            attributes: user,
        }))
    }
}
