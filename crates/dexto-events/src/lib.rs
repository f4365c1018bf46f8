//! Dexto Events - Typed event bus for the Dexto agent runtime.
//!
//! This crate provides:
//! - Event types for every runtime topic (`dexto:*` and `llmservice:*`)
//! - A broadcast-based event bus for async subscribers
//! - A subscriber registry for synchronous handlers
//!
//! # Architecture
//!
//! Events are published to an [`EventBus`] which broadcasts them to all
//! subscribers. There are two ways to subscribe:
//!
//! 1. **Async receivers**: `bus.subscribe()` returns an [`EventReceiver`]
//!    that can be polled asynchronously.
//! 2. **Synchronous subscribers**: implementations of [`EventSubscriber`]
//!    registered with the registry receive immediate callbacks.
//!
//! Only the component that owns a topic emits it; subscribers are
//! notification targets, never coordinators. A panicking subscriber is
//! isolated; the remaining subscribers still receive the event.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{AgentEvent, ApprovalKind, ApprovalStatus, ChunkKind, EventMetadata};
pub use subscriber::{EventSubscriber, SubscriberId, SubscriberRegistry};
