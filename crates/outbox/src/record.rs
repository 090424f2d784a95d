use std::time::Duration;

use chrono::{DateTime, Utc};
use events::{EventEnvelope, EventId};

/// An outbox row, persisted alongside domain state in the same transaction.
///
/// Lifecycle: created unpublished, transitioned to published by the relay
/// exactly once, or exhausted when `retry_count` reaches the configured
/// maximum. `retry_count` only increases.
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    /// Same UUID as the embedded event's id, for traceability.
    pub id: EventId,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub event_type: String,
    /// Bus topic the event is published to.
    pub topic: String,
    /// Full serialized event envelope.
    pub payload: serde_json::Value,
    /// `None` until successfully published.
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    /// Relay skips the record while `next_retry_at` is in the future.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboxRecord {
    /// Builds a record for an envelope, serializing it as the payload.
    ///
    /// Fails with a serialization error if the envelope cannot be encoded,
    /// which must fail the caller's enclosing transaction.
    pub fn for_event(
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        envelope: &EventEnvelope,
    ) -> Result<Self, serde_json::Error> {
        let now = Utc::now();
        Ok(Self {
            id: envelope.id,
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            event_type: envelope.event_type().to_string(),
            topic: envelope.topic().to_string(),
            payload: serde_json::to_value(envelope)?,
            published_at: None,
            retry_count: 0,
            last_error: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// True once the record has been relayed to the bus.
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// True when the record has used up its publish attempts.
    pub fn is_exhausted(&self, max_retries: i32) -> bool {
        self.retry_count >= max_retries
    }

    /// True when the relay may pick the record up at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>, max_retries: i32) -> bool {
        !self.is_published()
            && !self.is_exhausted(max_retries)
            && self.next_retry_at.is_none_or(|t| t <= now)
    }

    /// Marks the record as successfully published.
    pub fn mark_published(&mut self) {
        let now = Utc::now();
        self.published_at = Some(now);
        self.updated_at = now;
    }

    /// Records a publish failure and schedules the exponential backoff
    /// retry: `backoff_base * 2^(retry_count - 1)`, i.e. 5, 10, 20, 40,
    /// 80 seconds with the default base.
    pub fn record_failure(&mut self, error: impl Into<String>, backoff_base: Duration) {
        let now = Utc::now();
        self.retry_count += 1;
        self.last_error = Some(error.into());
        let backoff = backoff_base * 2u32.pow(self.retry_count.saturating_sub(1).min(30) as u32);
        let backoff =
            chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::days(3650));
        self.next_retry_at = Some(now + backoff);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CorrelationId, CustomerId, OrderId};
    use events::{EventPayload, OrderConfirmedData, topics};

    fn record() -> OutboxRecord {
        let envelope = EventEnvelope::new(
            topics::SOURCE_ORDER_SERVICE,
            CorrelationId::new("corr-1"),
            None,
            EventPayload::OrderConfirmed(OrderConfirmedData {
                order_id: OrderId::new("ord_1"),
                customer_id: CustomerId::new("cus_1"),
            }),
        );
        OutboxRecord::for_event("ord_1", "Order", &envelope).unwrap()
    }

    #[test]
    fn new_record_is_unpublished_and_eligible() {
        let record = record();
        assert!(!record.is_published());
        assert!(!record.is_exhausted(5));
        assert!(record.is_eligible(Utc::now(), 5));
        assert_eq!(record.event_type, "orders.confirmed");
        assert_eq!(record.topic, "orders.confirmed");
    }

    #[test]
    fn record_id_equals_event_id() {
        let envelope = EventEnvelope::new(
            topics::SOURCE_ORDER_SERVICE,
            CorrelationId::new("corr-1"),
            None,
            EventPayload::OrderConfirmed(OrderConfirmedData {
                order_id: OrderId::new("ord_1"),
                customer_id: CustomerId::new("cus_1"),
            }),
        );
        let record = OutboxRecord::for_event("ord_1", "Order", &envelope).unwrap();
        assert_eq!(record.id, envelope.id);
    }

    #[test]
    fn published_record_is_not_eligible() {
        let mut record = record();
        record.mark_published();
        assert!(record.is_published());
        assert!(!record.is_eligible(Utc::now(), 5));
    }

    #[test]
    fn failure_schedules_doubling_backoff() {
        let mut record = record();
        let base = Duration::from_secs(5);

        let expected_secs = [5, 10, 20, 40, 80];
        for (i, expected) in expected_secs.iter().enumerate() {
            let before = Utc::now();
            record.record_failure("broker down", base);
            assert_eq!(record.retry_count as usize, i + 1);

            let delay = record.next_retry_at.unwrap() - before;
            assert!(delay >= chrono::Duration::seconds(*expected - 1));
            assert!(delay <= chrono::Duration::seconds(*expected + 1));
        }

        assert!(record.is_exhausted(5));
        assert!(!record.is_eligible(Utc::now(), 5));
        assert_eq!(record.last_error.as_deref(), Some("broker down"));
    }

    #[test]
    fn backoff_defers_eligibility() {
        let mut record = record();
        record.record_failure("broker down", Duration::from_secs(5));

        let now = Utc::now();
        assert!(!record.is_eligible(now, 5));
        // Once the clock passes next_retry_at the record is eligible again.
        assert!(record.is_eligible(now + chrono::Duration::seconds(6), 5));
    }
}
