//! In-memory cache store.

use crate::ports::{CacheConnector, CacheStore, ResourceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache client backed by a map with per-key expiry.
pub struct MemoryCache {
    url: String,
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), ResourceError> {
        if self.is_closed() {
            Err(ResourceError::Closed("cache"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ResourceError> {
        self.ensure_open()?;
        let mut entries = self.entries.lock();
        let expired = matches!(entries.get(key), Some((_, Some(deadline))) if *deadline <= Instant::now());
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), ResourceError> {
        self.ensure_open()?;
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, ResourceError> {
        self.ensure_open()?;
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out independent [`MemoryCache`] clients.
#[derive(Default)]
pub struct MemoryCacheConnector {
    connections: AtomicUsize,
}

impl MemoryCacheConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clients created so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheConnector for MemoryCacheConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn CacheStore>, ResourceError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        debug!(url, "In-memory cache client created");
        Ok(Arc::new(MemoryCache::new(url)))
    }
}
