//! # Adapters
//!
//! Implementations of the [`crate::ports`] interfaces that ship with the
//! runtime. The in-memory stores stand in for the document and cache
//! drivers in tests and single-node development.

mod api_key;
mod memory_cache;
mod memory_store;
mod process_launcher;

pub use api_key::{ApiKeyStrategy, API_KEY_HEADER, API_KEY_STRATEGY};
pub use memory_cache::{MemoryCache, MemoryCacheConnector};
pub use memory_store::{MemoryDataStore, MemoryDataStoreConnector};
pub use process_launcher::ProcessLauncher;
