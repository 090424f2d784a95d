//! Idempotent consumer dispatch.
//!
//! Every consumer on the platform processes messages through [`dispatch`]:
//!
//! 1. Extract the event id from the `event-id` header. Absent means the
//!    message cannot be deduplicated: acknowledge and drop.
//! 2. Ask the [`IdempotencyGuard`]. Duplicate: acknowledge and return.
//! 3. Run the handler. Success: acknowledge.
//! 4. Handler error: do NOT acknowledge. The bus redelivers, the guard now
//!    short-circuits, and the net effect is at-most-once processing.
//!
//! Acknowledgement itself belongs to the transport; `dispatch` reports the
//! decision through its return value — `Ok` means acknowledge, `Err` means
//! leave unacknowledged for redelivery.
//!
//! The transport's error handler owns what happens to a failing message:
//! transient handler errors retry per [`RetryPolicy`] and then dead-letter
//! via [`route_to_dlq`]; unparseable payloads are non-retryable and go to
//! the dead-letter queue immediately.

use std::time::Duration;

use events::headers;

use crate::bus::{BusMessage, EventBus};
use crate::error::{BusError, KvError};
use crate::idempotency::IdempotencyGuard;
use crate::kv::KeyValueStore;

/// Outcome of a dispatched message. Any variant means "acknowledge".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The handler ran to completion.
    Handled,
    /// The event was already processed; the handler did not run.
    Duplicate,
    /// The message had no `event-id` header and was dropped.
    MissingEventId,
}

/// Runs `handler` for `message` under the idempotency contract.
///
/// On `Err` the message must not be acknowledged; the error is the
/// handler's own. Guard failures also propagate (as `E: From<KvError>`)
/// because without the guard's verdict no side effect may run.
pub async fn dispatch<K, E, F, Fut>(
    guard: &IdempotencyGuard<K>,
    topic: &str,
    message: &BusMessage,
    handler: F,
) -> Result<Disposition, E>
where
    K: KeyValueStore,
    E: From<KvError>,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let Some(event_id) = message.header(headers::EVENT_ID) else {
        tracing::warn!(topic, "message missing event-id header, dropping");
        return Ok(Disposition::MissingEventId);
    };

    if guard.is_duplicate(event_id, topic).await? {
        return Ok(Disposition::Duplicate);
    }

    handler(message.payload.clone()).await?;

    tracing::debug!(event_id, topic, "event processed");
    Ok(Disposition::Handled)
}

/// Bounded-retry policy applied by the bus error handler before a message
/// is routed to the dead-letter queue.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry `attempt` (1-based): the base doubled
    /// per attempt, capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(1u32 << exponent);
        delay.min(self.cap)
    }

    /// True when the attempt count has exhausted the policy.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Routes a poisoned message to a dead-letter topic.
///
/// The original topic and terminal error travel as headers so the DLQ can
/// be inspected and replayed.
pub async fn route_to_dlq<B: EventBus>(
    bus: &B,
    dlq_topic: &str,
    original_topic: &str,
    mut message: BusMessage,
    error: &str,
) -> Result<(), BusError> {
    message
        .headers
        .insert("dlq-original-topic".to_string(), original_topic.to_string());
    message
        .headers
        .insert("dlq-error".to_string(), error.to_string());

    tracing::error!(
        original_topic,
        dlq_topic,
        error,
        "routing message to dead-letter queue"
    );
    bus.publish(dlq_topic, message).await
}
