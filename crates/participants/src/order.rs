//! Order write side.
//!
//! `create_order` is the canonical outbox write path: the order row, the
//! outbox record and the event-log entry are produced in one atomic unit,
//! and the relay later publishes `orders.created` to kick off the saga.
//! With the Postgres outbox store all three writes share one database
//! transaction (`PostgresOutboxStore::append_in_tx`); the in-memory store
//! used in tests appends after the row insert under the same call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use common::{CorrelationId, CustomerId, Money, OrderId};
use events::{EventEnvelope, EventPayload, OrderItem, ShippingAddress, payload, topics};
use outbox::{OutboxRecord, OutboxStore};

use crate::error::{ParticipantError, Result};

/// Order write-model status, advanced by the saga consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    ReservingInventory,
    ProcessingPayment,
    Confirmed,
    Cancelled,
}

/// The order write model.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Command to create an order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub customer_id: CustomerId,
    pub items: Vec<OrderItem>,
    pub payment_method: String,
    pub shipping_address: ShippingAddress,
    /// Caller-provided saga id; generated when absent.
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    /// Append-only audit log of envelopes per order.
    event_log: Vec<(OrderId, EventEnvelope)>,
}

/// Write-side command service for orders.
#[derive(Clone)]
pub struct OrderCommandService<S: OutboxStore> {
    state: Arc<RwLock<OrderState>>,
    outbox: S,
}

impl<S: OutboxStore> OrderCommandService<S> {
    /// Creates a service writing events through the given outbox store.
    pub fn new(outbox: S) -> Self {
        Self {
            state: Arc::new(RwLock::new(OrderState::default())),
            outbox,
        }
    }

    /// Creates an order and stages its `orders.created` event.
    ///
    /// The event reaches the bus only through the outbox relay, so a crash
    /// between this call and the relay tick loses nothing: either the
    /// whole unit committed (order + outbox row) or none of it did.
    pub async fn create_order(&self, cmd: CreateOrderCommand) -> Result<Order> {
        let order_id = OrderId::generate();
        let correlation_id = cmd
            .correlation_id
            .unwrap_or_else(CorrelationId::generate);

        let data = payload::order_created(
            order_id.clone(),
            cmd.customer_id.clone(),
            cmd.items.clone(),
            "USD",
            cmd.payment_method.clone(),
            cmd.shipping_address.clone(),
        );

        let now = Utc::now();
        let order = Order {
            id: order_id.clone(),
            customer_id: cmd.customer_id,
            status: OrderStatus::Pending,
            items: cmd.items,
            total_amount: data.total_amount,
            currency: data.currency.clone(),
            payment_method: cmd.payment_method,
            shipping_address: cmd.shipping_address,
            correlation_id: correlation_id.clone(),
            created_at: now,
            updated_at: now,
        };

        let envelope = EventEnvelope::new(
            topics::SOURCE_ORDER_SERVICE,
            correlation_id,
            None,
            EventPayload::OrderCreated(data),
        );
        let record = OutboxRecord::for_event(order_id.as_str(), "Order", &envelope)?;

        {
            let mut state = self.state.write().unwrap();
            state.orders.insert(order_id.clone(), order.clone());
            state.event_log.push((order_id.clone(), envelope));
        }
        self.outbox.append(record).await?;

        tracing::info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            total_amount = %order.total_amount,
            correlation_id = %order.correlation_id,
            "order created"
        );
        Ok(order)
    }

    /// Updates the write-model status, called by the saga consumers.
    pub fn update_status(&self, order_id: &OrderId, status: OrderStatus) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ParticipantError::OrderNotFound(order_id.clone()))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Appends an envelope to the order's audit log.
    pub fn record_event(&self, order_id: &OrderId, envelope: EventEnvelope) {
        self.state
            .write()
            .unwrap()
            .event_log
            .push((order_id.clone(), envelope));
    }

    /// Returns an order by id.
    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.state.read().unwrap().orders.get(order_id).cloned()
    }

    /// Returns the audit log for one order, in append order.
    pub fn events_for(&self, order_id: &OrderId) -> Vec<EventEnvelope> {
        self.state
            .read()
            .unwrap()
            .event_log
            .iter()
            .filter(|(id, _)| id == order_id)
            .map(|(_, e)| e.clone())
            .collect()
    }
}
