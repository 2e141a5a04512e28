//! # Kernel Events
//!
//! Events are named and carry an arbitrary JSON payload. The kernel itself
//! emits `started`, `stopping` and `http`; anything else comes from plugins.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single event flowing through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelEvent {
    /// Event name, e.g. `started` or `users:signUp`.
    pub name: String,
    /// Free-form payload.
    pub payload: serde_json::Value,
}

impl KernelEvent {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Synchronous event handler attached with [`crate::InMemoryEventBus::on`].
pub type Listener = Arc<dyn Fn(&KernelEvent) + Send + Sync>;

/// Filter for broadcast subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Event names to include. Empty means every event.
    pub names: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific event names.
    #[must_use]
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &KernelEvent) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| *n == event.name)
    }
}
