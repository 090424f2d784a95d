//! Transactional outbox.
//!
//! Turns "write state + publish event" into a single atomic commit: the
//! event is written as an outbox row in the same transaction as the domain
//! change, and a background relay publishes unsent rows to the bus with
//! exponential backoff. Either both the state change and the event become
//! visible, or neither does — no lost events, no phantom events.
//!
//! The relay delivers at-least-once; consumers deduplicate through the
//! idempotency guard in the `messaging` crate.

pub mod config;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod relay;
pub mod store;

pub use config::OutboxConfig;
pub use error::{OutboxError, Result};
pub use memory::InMemoryOutboxStore;
pub use postgres::PostgresOutboxStore;
pub use record::OutboxRecord;
pub use relay::OutboxRelay;
pub use store::{OutboxStore, RelayReport};
