//! Canonical event model for the order platform.
//!
//! Every message crossing the bus is an [`EventEnvelope`]: CloudEvents-style
//! metadata (id, source, time, correlation/causation ids, schema version)
//! wrapping exactly one variant of the closed [`EventPayload`] sum. The
//! envelope's `type` field doubles as the bus topic name.

pub mod envelope;
pub mod headers;
pub mod payload;
pub mod topics;

pub use envelope::{EventEnvelope, EventId};
pub use payload::{
    EventPayload, InventoryReleasedData, InventoryReservationFailedData, InventoryReservedData,
    InventoryReserveRequestedData, NotificationSendData, OrderCancelledData, OrderConfirmedData,
    OrderCreatedData, OrderItem, PaymentCompletedData, PaymentFailedData, PaymentInitiatedData,
    PaymentRefundedData, ShippingAddress,
};
