//! End-to-end orchestrator behavior with in-memory state store and bus.
//!
//! Participant responses are injected as envelopes on the saga's
//! correlation id, exactly as they would arrive off the bus partition.

use std::collections::HashMap;
use std::time::Duration;

use common::{CorrelationId, CustomerId, Money, OrderId, PaymentId, ProductId};
use events::{
    EventEnvelope, EventPayload, InventoryReservationFailedData, InventoryReservedData,
    OrderConfirmedData, OrderItem, PaymentCompletedData, PaymentFailedData, ShippingAddress,
    headers, payload, topics,
};
use messaging::{
    BusMessage, EventPublisher, IdempotencyGuard, InMemoryEventBus, InMemoryKeyValueStore,
    dispatch,
};
use saga::{OrderSagaOrchestrator, SagaConfig, SagaState, SagaStateStore, SagaStatus, SagaStep};

type TestOrchestrator =
    OrderSagaOrchestrator<InMemoryKeyValueStore, EventPublisher<InMemoryEventBus>>;

struct Harness {
    orchestrator: TestOrchestrator,
    bus: InMemoryEventBus,
    kv: InMemoryKeyValueStore,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SagaConfig::default())
    }

    fn with_config(config: SagaConfig) -> Self {
        let bus = InMemoryEventBus::new();
        let kv = InMemoryKeyValueStore::new();
        let orchestrator =
            OrderSagaOrchestrator::new(kv.clone(), EventPublisher::new(bus.clone()), config);
        Self {
            orchestrator,
            bus,
            kv,
        }
    }

    fn store(&self) -> SagaStateStore<InMemoryKeyValueStore> {
        SagaStateStore::new(self.kv.clone(), Duration::from_secs(2100))
    }

    async fn state(&self, correlation: &str) -> SagaState {
        self.store()
            .load(&CorrelationId::new(correlation))
            .await
            .unwrap()
            .expect("saga state missing")
    }

    /// Every envelope emitted on `correlation`, as `(topic, envelope)` in
    /// publish order.
    async fn emitted(&self, correlation: &str) -> Vec<(String, EventEnvelope)> {
        self.bus
            .envelope_log()
            .await
            .into_iter()
            .filter(|(_, e)| e.correlation_id.as_str() == correlation)
            .collect()
    }

    async fn emitted_topics(&self, correlation: &str) -> Vec<String> {
        self.emitted(correlation)
            .await
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }
}

fn order_created_envelope(correlation: &str) -> EventEnvelope {
    let data = payload::order_created(
        OrderId::new("ord_test_001"),
        CustomerId::new("cus_test_001"),
        vec![OrderItem::new("prod_1", 2, Money::from_cents(4999))],
        "USD",
        "card",
        ShippingAddress {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            country: "US".to_string(),
            postal_code: "11111".to_string(),
        },
    );
    EventEnvelope::new(
        topics::SOURCE_ORDER_SERVICE,
        CorrelationId::new(correlation),
        None,
        EventPayload::OrderCreated(data),
    )
}

fn inventory_reserved_envelope(correlation: &str) -> EventEnvelope {
    EventEnvelope::new(
        topics::SOURCE_INVENTORY_SERVICE,
        CorrelationId::new(correlation),
        Some(events::EventId::new()),
        EventPayload::InventoryReserved(InventoryReservedData {
            order_id: OrderId::new("ord_test_001"),
            items: vec![OrderItem::new("prod_1", 2, Money::from_cents(4999))],
        }),
    )
}

fn payment_completed_envelope(correlation: &str, payment: &str) -> EventEnvelope {
    EventEnvelope::new(
        topics::SOURCE_PAYMENT_SERVICE,
        CorrelationId::new(correlation),
        Some(events::EventId::new()),
        EventPayload::PaymentCompleted(PaymentCompletedData {
            order_id: OrderId::new("ord_test_001"),
            payment_id: PaymentId::new(payment),
            amount: Money::from_cents(9998),
            currency: "USD".to_string(),
        }),
    )
}

fn order_confirmed_envelope(correlation: &str) -> EventEnvelope {
    EventEnvelope::new(
        topics::SOURCE_ORDER_SERVICE,
        CorrelationId::new(correlation),
        Some(events::EventId::new()),
        EventPayload::OrderConfirmed(OrderConfirmedData {
            order_id: OrderId::new("ord_test_001"),
            customer_id: CustomerId::new("cus_test_001"),
        }),
    )
}

fn payment_failed_envelope(correlation: &str, reason: &str) -> EventEnvelope {
    EventEnvelope::new(
        topics::SOURCE_PAYMENT_SERVICE,
        CorrelationId::new(correlation),
        Some(events::EventId::new()),
        EventPayload::PaymentFailed(PaymentFailedData {
            order_id: OrderId::new("ord_test_001"),
            reason: reason.to_string(),
        }),
    )
}

fn reservation_failed_envelope(correlation: &str, reason: &str) -> EventEnvelope {
    EventEnvelope::new(
        topics::SOURCE_INVENTORY_SERVICE,
        CorrelationId::new(correlation),
        Some(events::EventId::new()),
        EventPayload::InventoryReservationFailed(InventoryReservationFailedData {
            order_id: OrderId::new("ord_test_001"),
            reason: reason.to_string(),
            insufficient_product_ids: vec![ProductId::new("prod_1")],
        }),
    )
}

#[tokio::test]
async fn happy_path_runs_all_steps_to_completion() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C1"))
        .await
        .unwrap();
    assert_eq!(h.state("C1").await.status, SagaStatus::ReservingInventory);

    let reserved = inventory_reserved_envelope("C1");
    h.orchestrator.handle(&reserved).await.unwrap();
    assert_eq!(h.state("C1").await.status, SagaStatus::ProcessingPayment);

    h.orchestrator
        .handle(&payment_completed_envelope("C1", "pay_1"))
        .await
        .unwrap();
    assert_eq!(h.state("C1").await.status, SagaStatus::Confirming);

    h.orchestrator
        .handle(&order_confirmed_envelope("C1"))
        .await
        .unwrap();

    let state = h.state("C1").await;
    assert_eq!(state.status, SagaStatus::Completed);
    assert!(state.completed_at.is_some());
    assert_eq!(state.payment_id, Some(PaymentId::new("pay_1")));
    assert_eq!(
        state.completed_steps,
        vec![
            SagaStep::ReserveInventory,
            SagaStep::ProcessPayment,
            SagaStep::ConfirmOrder,
        ]
    );

    // Outbound sequence on C1's partition.
    assert_eq!(
        h.emitted_topics("C1").await,
        vec![
            topics::INVENTORY_RESERVE_REQUESTED,
            topics::PAYMENTS_INITIATED,
            topics::ORDERS_CONFIRMED,
            topics::NOTIFICATIONS_SEND,
        ]
    );

    let emitted = h.emitted("C1").await;

    // payments.initiated was caused by the inventory.reserved event.
    let (_, payments_initiated) = &emitted[1];
    assert_eq!(payments_initiated.causation_id, Some(reserved.id));
    match &payments_initiated.payload {
        EventPayload::PaymentInitiated(data) => {
            assert_eq!(data.amount, Money::from_cents(9998));
            assert_eq!(data.currency, "USD");
        }
        other => panic!("expected payments.initiated payload, got {other:?}"),
    }

    // Completion notification uses the order-confirmed template.
    let (_, notification) = &emitted[3];
    match &notification.payload {
        EventPayload::NotificationSend(data) => {
            assert_eq!(data.template_id, "order-confirmed");
            assert_eq!(data.variables["orderId"], "ord_test_001");
            assert_eq!(data.variables["totalAmount"], 9998);
        }
        other => panic!("expected notifications.send payload, got {other:?}"),
    }
}

#[tokio::test]
async fn inventory_failure_before_any_step_skips_release() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C2"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&reservation_failed_envelope("C2", "Out of stock"))
        .await
        .unwrap();

    let state = h.state("C2").await;
    assert_eq!(state.status, SagaStatus::Compensated);
    assert!(state.failure_reason.as_deref().unwrap().contains("Out of stock"));
    assert!(state.failed_at.is_some());

    let topics_seen = h.emitted_topics("C2").await;
    // No step completed, so nothing to compensate: no inventory.released,
    // no payments.refunded. Just cancel and notify.
    assert_eq!(
        topics_seen,
        vec![
            topics::INVENTORY_RESERVE_REQUESTED,
            topics::ORDERS_CANCELLED,
            topics::NOTIFICATIONS_SEND,
        ]
    );

    let emitted = h.emitted("C2").await;
    let (_, notification) = emitted.last().unwrap();
    match &notification.payload {
        EventPayload::NotificationSend(data) => {
            assert_eq!(data.template_id, "order-cancelled");
            assert!(
                data.variables["reason"]
                    .as_str()
                    .unwrap()
                    .contains("Out of stock")
            );
        }
        other => panic!("expected notifications.send payload, got {other:?}"),
    }
}

#[tokio::test]
async fn payment_failure_releases_inventory_but_never_refunds() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C3"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&inventory_reserved_envelope("C3"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&payment_failed_envelope("C3", "Declined"))
        .await
        .unwrap();

    let state = h.state("C3").await;
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(state.completed_steps, vec![SagaStep::ReserveInventory]);

    let topics_seen = h.emitted_topics("C3").await;
    assert_eq!(
        topics_seen,
        vec![
            topics::INVENTORY_RESERVE_REQUESTED,
            topics::PAYMENTS_INITIATED,
            topics::INVENTORY_RELEASED,
            topics::ORDERS_CANCELLED,
            topics::NOTIFICATIONS_SEND,
        ]
    );
    // The payment never completed, so it is never refunded.
    assert!(!topics_seen.contains(&topics::PAYMENTS_REFUNDED.to_string()));
}

#[tokio::test]
async fn full_chain_rollback_refunds_then_releases() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C4"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&inventory_reserved_envelope("C4"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&payment_completed_envelope("C4", "pay_7"))
        .await
        .unwrap();

    // Out-of-band failure after two completed steps, before confirmation.
    h.orchestrator
        .handle(&payment_failed_envelope("C4", "Chargeback probe"))
        .await
        .unwrap();

    let state = h.state("C4").await;
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(
        state.completed_steps,
        vec![SagaStep::ReserveInventory, SagaStep::ProcessPayment]
    );

    // Reverse completion order: refund the payment first, then release the
    // reservation, then cancel and notify.
    let topics_seen = h.emitted_topics("C4").await;
    assert_eq!(
        topics_seen[3..],
        [
            topics::PAYMENTS_REFUNDED.to_string(),
            topics::INVENTORY_RELEASED.to_string(),
            topics::ORDERS_CANCELLED.to_string(),
            topics::NOTIFICATIONS_SEND.to_string(),
        ]
    );

    let emitted = h.emitted("C4").await;
    let (_, refund) = &emitted[3];
    match &refund.payload {
        EventPayload::PaymentRefunded(data) => {
            assert_eq!(data.payment_id, PaymentId::new("pay_7"));
            assert_eq!(data.amount, Money::from_cents(9998));
        }
        other => panic!("expected payments.refunded payload, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_delivery_advances_saga_once() {
    let h = Harness::new();
    let guard = IdempotencyGuard::new(InMemoryKeyValueStore::new());

    h.orchestrator
        .handle(&order_created_envelope("C5"))
        .await
        .unwrap();

    let reserved = inventory_reserved_envelope("C5");
    let message = BusMessage {
        key: "C5".to_string(),
        headers: HashMap::from([(headers::EVENT_ID.to_string(), reserved.id.to_string())]),
        payload: serde_json::to_string(&reserved).unwrap(),
    };

    // The same bus message delivered twice; the consumer contract dedups.
    let orchestrator = &h.orchestrator;
    for _ in 0..2 {
        dispatch(
            &guard,
            topics::INVENTORY_RESERVED,
            &message,
            |payload| async move {
                let envelope: EventEnvelope = serde_json::from_str(&payload)?;
                orchestrator.handle(&envelope).await
            },
        )
        .await
        .unwrap();
    }

    assert_eq!(h.bus.topic_count(topics::PAYMENTS_INITIATED).await, 1);
    let state = h.state("C5").await;
    assert_eq!(state.status, SagaStatus::ProcessingPayment);
    assert_eq!(state.completed_steps, vec![SagaStep::ReserveInventory]);
}

#[tokio::test]
async fn out_of_sequence_event_is_discarded_without_mutation() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C6"))
        .await
        .unwrap();
    let before = h.emitted_topics("C6").await;

    // Payment response while still waiting on inventory.
    h.orchestrator
        .handle(&payment_completed_envelope("C6", "pay_9"))
        .await
        .unwrap();

    let state = h.state("C6").await;
    assert_eq!(state.status, SagaStatus::ReservingInventory);
    assert!(state.completed_steps.is_empty());
    assert!(state.payment_id.is_none());
    assert_eq!(h.emitted_topics("C6").await, before);
}

#[tokio::test]
async fn orphan_event_is_discarded_silently() {
    let h = Harness::new();

    h.orchestrator
        .handle(&inventory_reserved_envelope("C-unknown"))
        .await
        .unwrap();

    assert!(h.emitted("C-unknown").await.is_empty());
    assert!(
        h.store()
            .load(&CorrelationId::new("C-unknown"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn events_after_terminal_status_are_ignored() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C8"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&inventory_reserved_envelope("C8"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&payment_completed_envelope("C8", "pay_1"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&order_confirmed_envelope("C8"))
        .await
        .unwrap();
    assert_eq!(h.state("C8").await.status, SagaStatus::Completed);

    let count_before = h.emitted("C8").await.len();

    // A late failure after completion must not trigger compensation.
    h.orchestrator
        .handle(&payment_failed_envelope("C8", "too late"))
        .await
        .unwrap();

    let state = h.state("C8").await;
    assert_eq!(state.status, SagaStatus::Completed);
    assert_eq!(h.emitted("C8").await.len(), count_before);
}

#[tokio::test]
async fn compensation_runs_at_most_once() {
    let h = Harness::new();

    h.orchestrator
        .handle(&order_created_envelope("C9"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&inventory_reserved_envelope("C9"))
        .await
        .unwrap();
    h.orchestrator
        .handle(&payment_failed_envelope("C9", "Declined"))
        .await
        .unwrap();
    assert_eq!(h.state("C9").await.status, SagaStatus::Compensated);

    let released_before = h.bus.topic_count(topics::INVENTORY_RELEASED).await;
    let cancelled_before = h.bus.topic_count(topics::ORDERS_CANCELLED).await;

    // A second failure event for the same saga changes nothing.
    h.orchestrator
        .handle(&payment_failed_envelope("C9", "Declined again"))
        .await
        .unwrap();

    assert_eq!(
        h.bus.topic_count(topics::INVENTORY_RELEASED).await,
        released_before
    );
    assert_eq!(
        h.bus.topic_count(topics::ORDERS_CANCELLED).await,
        cancelled_before
    );
    let state = h.state("C9").await;
    assert!(state.failure_reason.as_deref().unwrap().contains("Declined"));
    assert!(!state.failure_reason.as_deref().unwrap().contains("again"));
}

#[tokio::test]
async fn timed_out_saga_compensates_and_discards_the_event() {
    let h = Harness::with_config(SagaConfig {
        timeout: Duration::from_millis(1),
        ..SagaConfig::default()
    });

    h.orchestrator
        .handle(&order_created_envelope("C10"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The response arrives after the deadline: the step result is dropped
    // and the saga compensates with a timeout reason.
    h.orchestrator
        .handle(&inventory_reserved_envelope("C10"))
        .await
        .unwrap();

    let state = h.state("C10").await;
    assert_eq!(state.status, SagaStatus::Compensated);
    assert_eq!(state.failure_reason.as_deref(), Some("Saga timed out"));
    // The reservation was never recorded as completed, so no payment was
    // initiated and nothing is released.
    assert!(state.completed_steps.is_empty());
    assert_eq!(h.bus.topic_count(topics::PAYMENTS_INITIATED).await, 0);
    assert_eq!(
        h.emitted_topics("C10").await[1..],
        [
            topics::ORDERS_CANCELLED.to_string(),
            topics::NOTIFICATIONS_SEND.to_string(),
        ]
    );
}

#[tokio::test]
async fn all_outbound_events_share_the_saga_correlation_id() {
    let h = Harness::new();

    let created = order_created_envelope("C11");
    h.orchestrator.handle(&created).await.unwrap();

    let emitted = h.emitted("C11").await;
    assert!(!emitted.is_empty());
    for (_, envelope) in &emitted {
        assert_eq!(envelope.correlation_id, CorrelationId::new("C11"));
        assert_eq!(envelope.source, topics::SOURCE_ORDER_SERVICE);
    }
    // The first outbound event is caused by the trigger.
    assert_eq!(emitted[0].1.causation_id, Some(created.id));
}
