//! Typed payloads for every event on the platform.
//!
//! Modeled as one closed sum so orchestrator and participants dispatch with
//! exhaustive matches instead of string comparisons. The serde tag is the
//! event type, which is also the topic name.

use std::collections::HashMap;

use common::{CustomerId, Money, OrderId, PaymentId, ProductId};
use serde::{Deserialize, Serialize};

/// All event payloads, tagged by event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "orders.created")]
    OrderCreated(OrderCreatedData),

    #[serde(rename = "orders.confirmed")]
    OrderConfirmed(OrderConfirmedData),

    #[serde(rename = "orders.cancelled")]
    OrderCancelled(OrderCancelledData),

    #[serde(rename = "payments.initiated")]
    PaymentInitiated(PaymentInitiatedData),

    #[serde(rename = "payments.completed")]
    PaymentCompleted(PaymentCompletedData),

    #[serde(rename = "payments.failed")]
    PaymentFailed(PaymentFailedData),

    #[serde(rename = "payments.refunded")]
    PaymentRefunded(PaymentRefundedData),

    #[serde(rename = "inventory.reserve-requested")]
    InventoryReserveRequested(InventoryReserveRequestedData),

    #[serde(rename = "inventory.reserved")]
    InventoryReserved(InventoryReservedData),

    #[serde(rename = "inventory.reservation-failed")]
    InventoryReservationFailed(InventoryReservationFailedData),

    #[serde(rename = "inventory.released")]
    InventoryReleased(InventoryReleasedData),

    #[serde(rename = "notifications.send")]
    NotificationSend(NotificationSendData),
}

impl EventPayload {
    /// Returns the event type string (also the topic name).
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::OrderCreated(_) => crate::topics::ORDERS_CREATED,
            EventPayload::OrderConfirmed(_) => crate::topics::ORDERS_CONFIRMED,
            EventPayload::OrderCancelled(_) => crate::topics::ORDERS_CANCELLED,
            EventPayload::PaymentInitiated(_) => crate::topics::PAYMENTS_INITIATED,
            EventPayload::PaymentCompleted(_) => crate::topics::PAYMENTS_COMPLETED,
            EventPayload::PaymentFailed(_) => crate::topics::PAYMENTS_FAILED,
            EventPayload::PaymentRefunded(_) => crate::topics::PAYMENTS_REFUNDED,
            EventPayload::InventoryReserveRequested(_) => {
                crate::topics::INVENTORY_RESERVE_REQUESTED
            }
            EventPayload::InventoryReserved(_) => crate::topics::INVENTORY_RESERVED,
            EventPayload::InventoryReservationFailed(_) => {
                crate::topics::INVENTORY_RESERVATION_FAILED
            }
            EventPayload::InventoryReleased(_) => crate::topics::INVENTORY_RELEASED,
            EventPayload::NotificationSend(_) => crate::topics::NOTIFICATIONS_SEND,
        }
    }
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }

    /// Line total: unit price times quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Shipping destination captured at order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub country: String,
    pub postal_code: String,
}

/// Payload of `orders.created` — the saga trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
}

/// Payload of `orders.confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
}

/// Payload of `orders.cancelled` — terminal domain marker of a compensated saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelledData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub reason: String,
}

/// Payload of `payments.initiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiatedData {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
}

/// Payload of `payments.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletedData {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub currency: String,
}

/// Payload of `payments.failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedData {
    pub order_id: OrderId,
    pub reason: String,
}

/// Payload of `payments.refunded` — compensation of a completed payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefundedData {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub amount: Money,
    pub currency: String,
}

/// Payload of `inventory.reserve-requested`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReserveRequestedData {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
}

/// Payload of `inventory.reserved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservedData {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
}

/// Payload of `inventory.reservation-failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservationFailedData {
    pub order_id: OrderId,
    pub reason: String,
    pub insufficient_product_ids: Vec<ProductId>,
}

/// Payload of `inventory.released` — compensation of a reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReleasedData {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
}

/// Payload of `notifications.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSendData {
    pub customer_id: CustomerId,
    /// Delivery channel: `email` | `sms`.
    pub channel: String,
    pub template_id: String,
    pub variables: HashMap<String, serde_json::Value>,
}

impl NotificationSendData {
    /// Convenience constructor for the common email case.
    pub fn email(
        customer_id: CustomerId,
        template_id: impl Into<String>,
        variables: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            customer_id,
            channel: "email".to_string(),
            template_id: template_id.into(),
            variables,
        }
    }
}

// Dead-letter correlation helper: which order an event concerns, if any.
impl EventPayload {
    /// Returns the order the payload refers to, when it has one.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            EventPayload::OrderCreated(d) => Some(&d.order_id),
            EventPayload::OrderConfirmed(d) => Some(&d.order_id),
            EventPayload::OrderCancelled(d) => Some(&d.order_id),
            EventPayload::PaymentInitiated(d) => Some(&d.order_id),
            EventPayload::PaymentCompleted(d) => Some(&d.order_id),
            EventPayload::PaymentFailed(d) => Some(&d.order_id),
            EventPayload::PaymentRefunded(d) => Some(&d.order_id),
            EventPayload::InventoryReserveRequested(d) => Some(&d.order_id),
            EventPayload::InventoryReserved(d) => Some(&d.order_id),
            EventPayload::InventoryReservationFailed(d) => Some(&d.order_id),
            EventPayload::InventoryReleased(d) => Some(&d.order_id),
            EventPayload::NotificationSend(_) => None,
        }
    }
}

/// Builds an `orders.created` payload, computing the total from the items.
pub fn order_created(
    order_id: OrderId,
    customer_id: CustomerId,
    items: Vec<OrderItem>,
    currency: impl Into<String>,
    payment_method: impl Into<String>,
    shipping_address: ShippingAddress,
) -> OrderCreatedData {
    let total_amount = items.iter().map(OrderItem::line_total).sum();
    OrderCreatedData {
        order_id,
        customer_id,
        items,
        total_amount,
        currency: currency.into(),
        payment_method: payment_method.into(),
        shipping_address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            country: "US".to_string(),
            postal_code: "11111".to_string(),
        }
    }

    #[test]
    fn event_type_matches_topic_name() {
        let payload = EventPayload::PaymentFailed(PaymentFailedData {
            order_id: OrderId::new("ord_1"),
            reason: "Declined".to_string(),
        });
        assert_eq!(payload.event_type(), "payments.failed");
    }

    #[test]
    fn order_created_computes_total() {
        let data = order_created(
            OrderId::new("ord_test_001"),
            CustomerId::new("cus_1"),
            vec![
                OrderItem::new("prod_1", 2, Money::from_cents(4999)),
                OrderItem::new("prod_2", 1, Money::from_cents(2)),
            ],
            "USD",
            "card",
            test_address(),
        );
        assert_eq!(data.total_amount, Money::from_cents(10000));
    }

    #[test]
    fn payload_tag_is_the_event_type() {
        let payload = EventPayload::InventoryReservationFailed(InventoryReservationFailedData {
            order_id: OrderId::new("ord_1"),
            reason: "Insufficient stock".to_string(),
            insufficient_product_ids: vec![ProductId::new("prod_1")],
        });

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "inventory.reservation-failed");
        assert_eq!(value["insufficientProductIds"][0], "prod_1");
    }

    #[test]
    fn roundtrip_every_variant_tag() {
        let order_id = OrderId::new("ord_1");
        let customer_id = CustomerId::new("cus_1");
        let items = vec![OrderItem::new("prod_1", 1, Money::from_cents(100))];

        let payloads = vec![
            EventPayload::OrderCreated(order_created(
                order_id.clone(),
                customer_id.clone(),
                items.clone(),
                "USD",
                "card",
                test_address(),
            )),
            EventPayload::OrderConfirmed(OrderConfirmedData {
                order_id: order_id.clone(),
                customer_id: customer_id.clone(),
            }),
            EventPayload::OrderCancelled(OrderCancelledData {
                order_id: order_id.clone(),
                customer_id: customer_id.clone(),
                reason: "r".to_string(),
            }),
            EventPayload::PaymentInitiated(PaymentInitiatedData {
                order_id: order_id.clone(),
                customer_id: customer_id.clone(),
                amount: Money::from_cents(100),
                currency: "USD".to_string(),
                payment_method: "card".to_string(),
            }),
            EventPayload::PaymentCompleted(PaymentCompletedData {
                order_id: order_id.clone(),
                payment_id: PaymentId::new("pay_1"),
                amount: Money::from_cents(100),
                currency: "USD".to_string(),
            }),
            EventPayload::PaymentFailed(PaymentFailedData {
                order_id: order_id.clone(),
                reason: "r".to_string(),
            }),
            EventPayload::PaymentRefunded(PaymentRefundedData {
                order_id: order_id.clone(),
                payment_id: PaymentId::new("pay_1"),
                amount: Money::from_cents(100),
                currency: "USD".to_string(),
            }),
            EventPayload::InventoryReserveRequested(InventoryReserveRequestedData {
                order_id: order_id.clone(),
                items: items.clone(),
            }),
            EventPayload::InventoryReserved(InventoryReservedData {
                order_id: order_id.clone(),
                items: items.clone(),
            }),
            EventPayload::InventoryReservationFailed(InventoryReservationFailedData {
                order_id: order_id.clone(),
                reason: "r".to_string(),
                insufficient_product_ids: vec![],
            }),
            EventPayload::InventoryReleased(InventoryReleasedData {
                order_id,
                items,
            }),
            EventPayload::NotificationSend(NotificationSendData::email(
                customer_id,
                "order-confirmed",
                HashMap::new(),
            )),
        ];

        for payload in payloads {
            let json = serde_json::to_string(&payload).unwrap();
            let back: EventPayload = serde_json::from_str(&json).unwrap();
            assert_eq!(back.event_type(), payload.event_type());
        }
    }
}
