//! Abstract message-bus transport.
//!
//! The platform never talks to a broker client directly; it publishes
//! keyed, headered messages through [`EventBus`]. The broker is assumed to
//! deliver at-least-once and to order messages with the same key within a
//! topic (one partition per key).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use events::EventEnvelope;
use tokio::sync::RwLock;

use crate::error::BusError;

/// A message as it travels on the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Partition key. For platform events this is the correlation id.
    pub key: String,
    /// UTF-8 headers (`event-id`, `event-type`, …).
    pub headers: HashMap<String, String>,
    /// Serialized event envelope.
    pub payload: String,
}

impl BusMessage {
    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// At-least-once transport to the message bus.
///
/// `publish` resolves once the broker has acknowledged the message. An
/// error means the message may or may not have been written; callers
/// (the outbox relay) retry, and consumers deduplicate.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError>;
}

#[derive(Default)]
struct InMemoryBusState {
    /// All publishes in order, across topics.
    log: Vec<(String, BusMessage)>,
}

/// In-memory bus for tests.
///
/// Records every publish in order and can be told to fail the next N
/// publishes to exercise retry paths.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<InMemoryBusState>>,
    fail_next: Arc<AtomicUsize>,
}

impl InMemoryEventBus {
    /// Creates a new empty in-memory bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` publishes fail with a broker error.
    pub fn fail_next_publishes(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Returns all messages published to `topic`, in publish order.
    pub async fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.state
            .read()
            .await
            .log
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Returns the number of messages published to `topic`.
    pub async fn topic_count(&self, topic: &str) -> usize {
        self.messages(topic).await.len()
    }

    /// Returns the full publish log: `(topic, message)` in publish order.
    pub async fn published(&self) -> Vec<(String, BusMessage)> {
        self.state.read().await.log.clone()
    }

    /// Deserializes every message on `topic` back into an envelope.
    pub async fn envelopes(&self, topic: &str) -> Vec<EventEnvelope> {
        self.messages(topic)
            .await
            .iter()
            .map(|m| serde_json::from_str(&m.payload).expect("malformed envelope on test bus"))
            .collect()
    }

    /// Returns `(topic, envelope)` for every publish, in publish order.
    pub async fn envelope_log(&self) -> Vec<(String, EventEnvelope)> {
        self.published()
            .await
            .iter()
            .map(|(t, m)| {
                let envelope =
                    serde_json::from_str(&m.payload).expect("malformed envelope on test bus");
                (t.clone(), envelope)
            })
            .collect()
    }

    /// Removes all recorded messages.
    pub async fn clear(&self) {
        self.state.write().await.log.clear();
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(BusError::Publish("injected broker failure".to_string()));
        }

        self.state
            .write()
            .await
            .log
            .push((topic.to_string(), message));
        Ok(())
    }
}
