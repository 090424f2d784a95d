//! Payment participant.
//!
//! Idempotent by order: a repeated `payments.initiated` for an order with
//! an existing payment row re-emits the stored outcome instead of charging
//! the customer again. Refunds are idempotent by payment id.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, PaymentId, RefundId};
use events::{
    EventEnvelope, EventPayload, PaymentCompletedData, PaymentFailedData, PaymentInitiatedData,
    PaymentRefundedData, topics,
};
use messaging::PublishEvent;
use thiserror::Error;

use crate::error::Result;

/// Lifecycle of a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Completed,
    Failed,
    Refunded,
}

/// A payment row, one per order.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
}

/// A refund row, one per payment.
#[derive(Debug, Clone)]
pub struct Refund {
    pub id: RefundId,
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: String,
}

/// The gateway declined a charge.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct GatewayDecline {
    pub reason: String,
}

/// Seam to the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Attempts to capture `amount`. `Ok` means the money moved.
    async fn charge(
        &self,
        payment_id: &PaymentId,
        amount: Money,
    ) -> std::result::Result<(), GatewayDecline>;
}

/// Test gateway: approves everything unless told to decline.
#[derive(Clone, Default)]
pub struct InMemoryPaymentGateway {
    decline: Arc<AtomicBool>,
}

impl InMemoryPaymentGateway {
    /// Creates an approving gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent charges fail.
    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        _payment_id: &PaymentId,
        _amount: Money,
    ) -> std::result::Result<(), GatewayDecline> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(GatewayDecline {
                reason: "Payment gateway declined: insufficient funds".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct PaymentState {
    payments: HashMap<OrderId, Payment>,
    refunds: HashMap<PaymentId, Refund>,
}

/// Handles payment request events and emits the response events.
#[derive(Clone)]
pub struct PaymentParticipant<P: PublishEvent, G: PaymentGateway> {
    state: Arc<RwLock<PaymentState>>,
    publisher: P,
    gateway: G,
}

impl<P: PublishEvent, G: PaymentGateway> PaymentParticipant<P, G> {
    /// Creates a participant over the given publisher and gateway.
    pub fn new(publisher: P, gateway: G) -> Self {
        Self {
            state: Arc::new(RwLock::new(PaymentState::default())),
            publisher,
            gateway,
        }
    }

    /// Returns the payment row for an order, if any.
    pub fn payment_for_order(&self, order_id: &OrderId) -> Option<Payment> {
        self.state.read().unwrap().payments.get(order_id).cloned()
    }

    /// Returns the refund row for a payment, if any.
    pub fn refund_for_payment(&self, payment_id: &PaymentId) -> Option<Refund> {
        self.state.read().unwrap().refunds.get(payment_id).cloned()
    }

    /// Number of payment rows.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Routes one inbound event.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match &envelope.payload {
            EventPayload::PaymentInitiated(data) => self.process_payment(envelope, data).await,
            EventPayload::PaymentRefunded(data) => self.process_refund(data),
            _ => {
                tracing::debug!(
                    event_type = envelope.event_type(),
                    "event is not a payment input, ignoring"
                );
                Ok(())
            }
        }
    }

    async fn process_payment(
        &self,
        envelope: &EventEnvelope,
        data: &PaymentInitiatedData,
    ) -> Result<()> {
        if let Some(existing) = self.payment_for_order(&data.order_id) {
            tracing::info!(
                order_id = %data.order_id,
                payment_id = %existing.id,
                "duplicate payment request, republishing stored result"
            );
            return self.publish_result(envelope, &existing).await;
        }

        let payment_id = PaymentId::generate();
        let (status, failure_reason) = match self.gateway.charge(&payment_id, data.amount).await {
            Ok(()) => (PaymentStatus::Completed, None),
            Err(decline) => (PaymentStatus::Failed, Some(decline.reason)),
        };

        let payment = Payment {
            id: payment_id,
            order_id: data.order_id.clone(),
            customer_id: data.customer_id.clone(),
            amount: data.amount,
            currency: data.currency.clone(),
            payment_method: data.payment_method.clone(),
            status,
            failure_reason,
        };
        self.state
            .write()
            .unwrap()
            .payments
            .insert(payment.order_id.clone(), payment.clone());

        match payment.status {
            PaymentStatus::Completed => tracing::info!(
                order_id = %payment.order_id,
                payment_id = %payment.id,
                amount = %payment.amount,
                "payment completed"
            ),
            _ => tracing::warn!(
                order_id = %payment.order_id,
                reason = payment.failure_reason.as_deref().unwrap_or(""),
                "payment failed"
            ),
        }

        self.publish_result(envelope, &payment).await
    }

    async fn publish_result(&self, cause: &EventEnvelope, payment: &Payment) -> Result<()> {
        let payload = match payment.status {
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                EventPayload::PaymentCompleted(PaymentCompletedData {
                    order_id: payment.order_id.clone(),
                    payment_id: payment.id.clone(),
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                })
            }
            PaymentStatus::Failed => EventPayload::PaymentFailed(PaymentFailedData {
                order_id: payment.order_id.clone(),
                reason: payment
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            }),
        };

        let envelope = EventEnvelope::new(
            topics::SOURCE_PAYMENT_SERVICE,
            cause.correlation_id.clone(),
            Some(cause.id),
            payload,
        );
        self.publisher.publish(envelope.topic(), &envelope).await?;
        Ok(())
    }

    /// Executes a refund (saga compensation). Idempotent by payment id;
    /// emits nothing — `payments.refunded` is the inbound command.
    fn process_refund(&self, data: &PaymentRefundedData) -> Result<()> {
        let mut state = self.state.write().unwrap();

        let Some(payment_id) = state.payments.get(&data.order_id).map(|p| p.id.clone()) else {
            tracing::warn!(order_id = %data.order_id, "refund for unknown payment, ignoring");
            return Ok(());
        };

        if state.refunds.contains_key(&payment_id) {
            tracing::info!(%payment_id, "duplicate refund request, skipping");
            return Ok(());
        }

        let refund = Refund {
            id: RefundId::generate(),
            payment_id: payment_id.clone(),
            order_id: data.order_id.clone(),
            amount: data.amount,
            currency: data.currency.clone(),
        };
        if let Some(payment) = state.payments.get_mut(&data.order_id) {
            payment.status = PaymentStatus::Refunded;
        }

        tracing::info!(
            refund_id = %refund.id,
            %payment_id,
            order_id = %data.order_id,
            "refund processed"
        );
        state.refunds.insert(payment_id, refund);
        Ok(())
    }
}
