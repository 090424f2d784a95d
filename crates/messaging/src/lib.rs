//! Messaging seams for the order platform.
//!
//! This crate owns the abstract contracts the core depends on rather than
//! any concrete broker or key-value client:
//!
//! - [`EventBus`] — at-least-once transport of keyed, headered messages,
//!   with [`InMemoryEventBus`] for tests.
//! - [`EventPublisher`] — serializes envelopes, attaches tracing headers,
//!   partitions by correlation id, and waits for broker acknowledgement.
//! - [`KeyValueStore`] — string get/set/expire plus atomic set-if-absent
//!   with TTL, with [`InMemoryKeyValueStore`] for tests.
//! - [`IdempotencyGuard`] — `(topic, event id)` deduplication on top of any
//!   key-value store.
//! - [`dispatch`] — the consumer-side contract: dedup before side effects,
//!   acknowledge only after success, let failures redeliver.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod idempotency;
pub mod kv;
pub mod publisher;

pub use bus::{BusMessage, EventBus, InMemoryEventBus};
pub use consumer::{Disposition, RetryPolicy, dispatch, route_to_dlq};
pub use error::{BusError, KvError, PublishError};
pub use idempotency::IdempotencyGuard;
pub use kv::{InMemoryKeyValueStore, KeyValueStore};
pub use publisher::{EventPublisher, PublishEvent};
