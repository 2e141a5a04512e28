//! # Configuration Normalizer
//!
//! Turns a [`RawConfig`] (file, builder calls, or both) into an immutable
//! [`KernelConfig`]. Omitted fields are derived from an [`EnvSource`];
//! validation runs in a fixed order so the first reported field is always
//! the same for the same input:
//!
//! ```text
//! hostUrl → secret → dataStoreUrl → cache → port → environment → limitWorkers
//! ```

mod env;
mod normalize;
mod raw;

pub use env::{EnvSource, ProcessEnv};
pub use normalize::{
    KernelConfig, DEFAULT_CACHE_URL, DEFAULT_DATA_STORE_URL, DEFAULT_ENVIRONMENT, DEFAULT_PORT,
    MIN_SECRET_LEN,
};
pub use raw::{CacheLocation, RawConfig};
