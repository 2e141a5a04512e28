//! # Shared Bus - Lifecycle Event Bus
//!
//! Every kernel instance owns one bus. Plugins observe it through Listener
//! contributions, request handlers and models publish to it through the
//! injected emit function.
//!
//! ## Delivery
//!
//! ```text
//!  emit("started", payload)
//!        │
//!        ├──► synchronous listeners (registration order, same call stack)
//!        │
//!        └──► broadcast channel ──► Subscription / EventStream (async)
//! ```
//!
//! Listeners run to completion before `emit` returns. Broadcast subscribers
//! that fall behind lose the oldest events rather than blocking emitters.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, KernelEvent, Listener};
pub use publisher::{EventPublisher, InMemoryEventBus, SharedEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before old events are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Emitted once the kernel finished materializing and bound its listener
/// (or decided not to, in headless mode).
pub const STARTED_EVENT: &str = "started";

/// Emitted at the beginning of shutdown, before any resource is released.
pub const STOPPING_EVENT: &str = "stopping";

/// Emitted after every HTTP request handled by the assembled application.
pub const HTTP_EVENT: &str = "http";
