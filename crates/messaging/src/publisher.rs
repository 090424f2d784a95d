//! Envelope publisher: the platform-level producer.

use std::collections::HashMap;

use async_trait::async_trait;
use events::{EventEnvelope, headers};

use crate::bus::{BusMessage, EventBus};
use crate::error::PublishError;

/// Seam for publishing envelopes.
///
/// The orchestrator, participants and outbox relay depend on this trait
/// rather than on a transport, so tests can swap in a recording bus.
#[async_trait]
pub trait PublishEvent: Send + Sync {
    /// Publishes an envelope and waits for broker acknowledgement.
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError>;
}

/// Publishes envelopes to an [`EventBus`].
///
/// Responsibilities:
/// - serialize the envelope to its wire JSON,
/// - attach the tracing headers (`event-id`, `event-type`, `event-version`,
///   `correlation-id`, and `causation-id` when present),
/// - use the correlation id as the partition key so every event of one
///   saga lands on the same partition and is totally ordered.
#[derive(Clone)]
pub struct EventPublisher<B: EventBus> {
    bus: B,
}

impl<B: EventBus> EventPublisher<B> {
    /// Creates a new publisher over the given bus.
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Returns a reference to the underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn build_message(envelope: &EventEnvelope) -> Result<BusMessage, PublishError> {
        let payload = serde_json::to_string(envelope)?;

        let mut message_headers = HashMap::new();
        message_headers.insert(headers::EVENT_ID.to_string(), envelope.id.to_string());
        message_headers.insert(
            headers::EVENT_TYPE.to_string(),
            envelope.event_type().to_string(),
        );
        message_headers.insert(
            headers::EVENT_VERSION.to_string(),
            envelope.version.to_string(),
        );
        message_headers.insert(
            headers::CORRELATION_ID.to_string(),
            envelope.correlation_id.to_string(),
        );
        if let Some(causation_id) = envelope.causation_id {
            message_headers.insert(headers::CAUSATION_ID.to_string(), causation_id.to_string());
        }

        Ok(BusMessage {
            key: envelope.correlation_id.to_string(),
            headers: message_headers,
            payload,
        })
    }
}

#[async_trait]
impl<B: EventBus> PublishEvent for EventPublisher<B> {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> Result<(), PublishError> {
        let message = Self::build_message(envelope)?;

        match self.bus.publish(topic, message).await {
            Ok(()) => {
                metrics::counter!("events.published").increment(1);
                tracing::debug!(
                    topic,
                    event_id = %envelope.id,
                    event_type = envelope.event_type(),
                    correlation_id = %envelope.correlation_id,
                    "event published"
                );
                Ok(())
            }
            Err(e) => {
                metrics::counter!("events.publish_errors").increment(1);
                tracing::error!(
                    topic,
                    event_id = %envelope.id,
                    event_type = envelope.event_type(),
                    error = %e,
                    "failed to publish event"
                );
                Err(e.into())
            }
        }
    }
}
