//! The bus itself: named synchronous listeners plus a broadcast channel
//! for async subscribers.

use crate::events::{EventFilter, KernelEvent, Listener};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// The emit-only view of the bus.
///
/// This is the narrow interface handed to request handlers and models: they
/// can announce things but cannot attach listeners.
pub trait EventPublisher: Send + Sync {
    /// Emit an event.
    ///
    /// # Returns
    ///
    /// The number of synchronous listeners and broadcast subscribers that
    /// were handed the event.
    fn emit(&self, name: &str, payload: serde_json::Value) -> usize;

    /// Events emitted since creation.
    fn events_emitted(&self) -> u64;
}

/// The process-wide event bus.
///
/// Synchronous listeners behave like a classic event emitter; the
/// `tokio::sync::broadcast` side serves async consumers.
pub struct InMemoryEventBus {
    /// Broadcast sender for async subscribers.
    sender: broadcast::Sender<KernelEvent>,

    /// Synchronous listeners by event name, in attachment order.
    listeners: RwLock<HashMap<String, Vec<Listener>>>,

    events_emitted: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    /// A bus holding [`DEFAULT_CHANNEL_CAPACITY`] undelivered events per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            events_emitted: AtomicU64::new(0),
            capacity,
        }
    }

    /// Attach a synchronous listener for `name`.
    pub fn on(&self, name: impl Into<String>, listener: Listener) {
        let name = name.into();
        debug!(event = %name, "Listener attached");
        self.listeners.write().entry(name).or_default().push(listener);
    }

    /// Number of synchronous listeners attached for `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.read().get(name).map_or(0, Vec::len)
    }

    /// Receive every later event `filter` accepts.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(names = ?filter.names, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// [`Self::subscribe`] as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    /// Live broadcast subscriptions and streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for InMemoryEventBus {
    fn emit(&self, name: &str, payload: serde_json::Value) -> usize {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        let event = KernelEvent::new(name, payload);

        // Listeners may emit in turn; never hold the lock while calling them.
        let listeners = self.listeners.read().get(name).cloned().unwrap_or_default();
        for listener in &listeners {
            listener(&event);
        }

        let receivers = self.sender.send(event).unwrap_or(0);
        trace!(
            event = name,
            listeners = listeners.len(),
            receivers,
            "Event emitted"
        );
        listeners.len() + receivers
    }

    fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }
}

/// Shared handle type used across the kernel.
pub type SharedEventBus = Arc<InMemoryEventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_emit_without_receivers() {
        let bus = InMemoryEventBus::new();

        let delivered = bus.emit("started", json!({"type": "app"}));
        assert_eq!(delivered, 0);
        assert_eq!(bus.events_emitted(), 1);
    }

    #[test]
    fn test_listeners_called_in_attachment_order() {
        let bus = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.on(
                "ping",
                Arc::new(move |event: &KernelEvent| {
                    seen.lock().push(format!("{tag}:{}", event.payload));
                }),
            );
        }

        assert_eq!(bus.emit("ping", json!("pong")), 2);
        assert_eq!(*seen.lock(), vec!["first:\"pong\"", "second:\"pong\""]);
    }

    #[test]
    fn test_listener_only_sees_its_event() {
        let bus = InMemoryEventBus::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        bus.on(
            "panic",
            Arc::new(move |_: &KernelEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit("started", json!({}));
        bus.emit("panic", json!({}));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("panic"), 1);
        assert_eq!(bus.listener_count("started"), 0);
    }

    #[test]
    fn test_listener_may_emit_reentrantly() {
        let bus = Arc::new(InMemoryEventBus::new());
        let hits = Arc::new(AtomicU64::new(0));

        let inner = Arc::clone(&bus);
        bus.on(
            "outer",
            Arc::new(move |_: &KernelEvent| {
                inner.emit("inner", json!(null));
            }),
        );
        let counter = Arc::clone(&hits);
        bus.on(
            "inner",
            Arc::new(move |_: &KernelEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit("outer", json!(null));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = InMemoryEventBus::new();
        let _sub1 = bus.subscribe(EventFilter::all());
        let _sub2 = bus.subscribe(EventFilter::all());

        assert_eq!(bus.emit("http", json!({"status": 200})), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }
}
