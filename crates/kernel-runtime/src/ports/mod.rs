//! # Ports
//!
//! The narrow interfaces through which the kernel talks to its external
//! collaborators. Adapters live in [`crate::adapters`].
//!
//! ```text
//! ┌────────────┐  DataStoreConnector  ┌───────────────┐
//! │            │ ───────────────────► │ document store│
//! │   kernel   │  CacheConnector      ├───────────────┤
//! │            │ ───────────────────► │ cache store   │
//! │            │  IdentityStrategy    ├───────────────┤
//! │            │ ───────────────────► │ identity prov.│
//! └────────────┘                      └───────────────┘
//! ```

mod cache_store;
mod data_store;
mod identity;

pub use cache_store::{CacheConnector, CacheStore};
pub use data_store::{DataStore, DataStoreConnector};
pub use identity::{IdentityError, IdentityStrategy, Principal};

use thiserror::Error;

/// Failures reported by collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Failed to connect {resource} at '{url}': {reason}")]
    Connect {
        resource: &'static str,
        url: String,
        reason: String,
    },

    #[error("{0} connection is closed")]
    Closed(&'static str),

    #[error("Model '{model}' failed: {reason}")]
    Model { model: String, reason: String },
}
