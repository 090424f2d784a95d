use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::EventPayload;

/// CloudEvents spec version carried by every envelope.
pub const SPEC_VERSION: &str = "1.0";

/// Content type of every serialized payload.
pub const DATA_CONTENT_TYPE: &str = "application/json";

/// Schema version of the current event payloads.
pub const SCHEMA_VERSION: i32 = 1;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EventId> for Uuid {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl std::str::FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An event envelope: CloudEvents metadata plus one typed payload.
///
/// On the wire this serializes to a single flat JSON object. The payload's
/// tag lands in the `type` field, so a serialized envelope looks like
///
/// ```json
/// {
///   "id": "6f9c…",
///   "type": "orders.created",
///   "source": "/services/order-service",
///   "time": "2024-03-01T12:00:00Z",
///   "correlationId": "…",
///   "causationId": null,
///   "version": 1,
///   "specversion": "1.0",
///   "datacontenttype": "application/json",
///   "orderId": "ord_…",
///   …
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Globally unique event identifier.
    pub id: EventId,

    /// URI path of the service that emitted the event.
    pub source: String,

    /// Instant the event occurred.
    pub time: DateTime<Utc>,

    /// Identifier shared by every event of one saga.
    pub correlation_id: CorrelationId,

    /// Id of the event that caused this one; `None` at saga entry.
    pub causation_id: Option<EventId>,

    /// Payload schema version.
    pub version: i32,

    /// CloudEvents spec version, always `"1.0"`.
    pub specversion: String,

    /// Payload content type, always `"application/json"`.
    pub datacontenttype: String,

    /// The typed payload; its tag is the `type` field on the wire.
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    /// Creates a new envelope with a fresh id and the current time.
    pub fn new(
        source: impl Into<String>,
        correlation_id: CorrelationId,
        causation_id: Option<EventId>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: EventId::new(),
            source: source.into(),
            time: Utc::now(),
            correlation_id,
            causation_id,
            version: SCHEMA_VERSION,
            specversion: SPEC_VERSION.to_string(),
            datacontenttype: DATA_CONTENT_TYPE.to_string(),
            payload,
        }
    }

    /// Returns the event type, which is also the topic the event belongs on.
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Returns the topic this event is published to.
    pub fn topic(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CustomerId, OrderId};

    fn confirmed_envelope() -> EventEnvelope {
        EventEnvelope::new(
            crate::topics::SOURCE_ORDER_SERVICE,
            CorrelationId::new("corr-1"),
            Some(EventId::new()),
            EventPayload::OrderConfirmed(crate::payload::OrderConfirmedData {
                order_id: OrderId::new("ord_test_001"),
                customer_id: CustomerId::new("cus_1"),
            }),
        )
    }

    #[test]
    fn event_id_new_creates_unique_ids() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn event_id_parses_from_string() {
        let id = EventId::new();
        let parsed: EventId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn envelope_carries_cloudevents_constants() {
        let envelope = confirmed_envelope();
        assert_eq!(envelope.specversion, "1.0");
        assert_eq!(envelope.datacontenttype, "application/json");
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.event_type(), "orders.confirmed");
        assert_eq!(envelope.topic(), "orders.confirmed");
    }

    #[test]
    fn envelope_wire_format_is_flat_camel_case() {
        let envelope = confirmed_envelope();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "orders.confirmed");
        assert_eq!(value["specversion"], "1.0");
        assert_eq!(value["orderId"], "ord_test_001");
        assert_eq!(value["customerId"], "cus_1");
        assert!(value["correlationId"].is_string());
        // Payload fields are flattened, not nested.
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn envelope_roundtrip() {
        let envelope = confirmed_envelope();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, envelope.id);
        assert_eq!(back.correlation_id, envelope.correlation_id);
        assert_eq!(back.causation_id, envelope.causation_id);
        assert_eq!(back.event_type(), envelope.event_type());
    }
}
