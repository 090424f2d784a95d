//! The order saga orchestrator.
//!
//! Central coordinator of the order-processing distributed transaction
//! (orchestration, not choreography). It consumes participant events,
//! advances the saga one step at a time, and on failure emits the
//! compensating events in reverse order of the steps that completed.
//!
//! The orchestrator holds no in-memory saga state; every decision loads
//! state from the [`SagaStateStore`] and persists the transition before
//! the triggering message is acknowledged.

use std::collections::HashMap;

use chrono::Utc;
use common::PaymentId;
use events::{
    EventEnvelope, EventId, EventPayload, InventoryReleasedData, InventoryReserveRequestedData,
    NotificationSendData, OrderCancelledData, OrderConfirmedData, OrderCreatedData,
    PaymentInitiatedData, PaymentRefundedData, topics,
};
use messaging::{KeyValueStore, PublishEvent};

use crate::Result;
use crate::config::SagaConfig;
use crate::state::{SagaState, SagaStatus, SagaStep};
use crate::store::SagaStateStore;

/// Orchestrates order sagas over a state store and an event publisher.
///
/// Safe to run in many instances concurrently: the bus partitions by
/// correlation id, so one saga's events are handled by one consumer at a
/// time.
pub struct OrderSagaOrchestrator<K, P>
where
    K: KeyValueStore,
    P: PublishEvent,
{
    state_store: SagaStateStore<K>,
    publisher: P,
    config: SagaConfig,
}

impl<K, P> OrderSagaOrchestrator<K, P>
where
    K: KeyValueStore,
    P: PublishEvent,
{
    /// Creates a new orchestrator.
    pub fn new(kv: K, publisher: P, config: SagaConfig) -> Self {
        let state_store = SagaStateStore::new(kv, config.state_ttl);
        Self {
            state_store,
            publisher,
            config,
        }
    }

    /// Returns the saga state store.
    pub fn state_store(&self) -> &SagaStateStore<K> {
        &self.state_store
    }

    /// Routes one inbound event through the saga state machine.
    ///
    /// Orphaned, late and out-of-sequence events are logged and discarded;
    /// they are not errors. An `Err` means a store or publish failure, and
    /// the caller must not acknowledge the message.
    #[tracing::instrument(
        skip(self, envelope),
        fields(
            event_type = envelope.event_type(),
            correlation_id = %envelope.correlation_id,
        )
    )]
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match &envelope.payload {
            EventPayload::OrderCreated(data) => self.start_saga(envelope, data).await,
            EventPayload::InventoryReserved(_) => self.on_inventory_reserved(envelope).await,
            EventPayload::PaymentCompleted(data) => {
                self.on_payment_completed(envelope, data.payment_id.clone()).await
            }
            EventPayload::OrderConfirmed(_) => self.on_order_confirmed(envelope).await,
            EventPayload::InventoryReservationFailed(data) => {
                let reason = format!("Inventory reservation failed: {}", data.reason);
                self.on_participant_failure(envelope, reason).await
            }
            EventPayload::PaymentFailed(data) => {
                let reason = format!("Payment failed: {}", data.reason);
                self.on_participant_failure(envelope, reason).await
            }
            // Commands and compensations the orchestrator emits itself.
            EventPayload::InventoryReserveRequested(_)
            | EventPayload::PaymentInitiated(_)
            | EventPayload::PaymentRefunded(_)
            | EventPayload::InventoryReleased(_)
            | EventPayload::OrderCancelled(_)
            | EventPayload::NotificationSend(_) => {
                tracing::debug!("event is not an orchestrator input, ignoring");
                Ok(())
            }
        }
    }

    /// Starts a new saga from an `orders.created` event.
    async fn start_saga(&self, envelope: &EventEnvelope, data: &OrderCreatedData) -> Result<()> {
        tracing::info!(order_id = %data.order_id, "starting order saga");

        let mut state = SagaState::start(
            envelope.correlation_id.clone(),
            data.clone(),
            self.config.timeout,
        );
        self.state_store.save(&state).await?;
        metrics::counter!("saga.started").increment(1);

        self.execute_step(&mut state, SagaStep::ReserveInventory, Some(envelope.id))
            .await
    }

    async fn on_inventory_reserved(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(mut state) = self
            .load_and_validate(envelope, SagaStatus::ReservingInventory)
            .await?
        else {
            return Ok(());
        };

        state.add_completed_step(SagaStep::ReserveInventory);
        self.state_store.save(&state).await?;

        self.execute_step(&mut state, SagaStep::ProcessPayment, Some(envelope.id))
            .await
    }

    async fn on_payment_completed(
        &self,
        envelope: &EventEnvelope,
        payment_id: PaymentId,
    ) -> Result<()> {
        let Some(mut state) = self
            .load_and_validate(envelope, SagaStatus::ProcessingPayment)
            .await?
        else {
            return Ok(());
        };

        state.payment_id = Some(payment_id);
        state.add_completed_step(SagaStep::ProcessPayment);
        self.state_store.save(&state).await?;

        self.execute_step(&mut state, SagaStep::ConfirmOrder, Some(envelope.id))
            .await
    }

    async fn on_order_confirmed(&self, envelope: &EventEnvelope) -> Result<()> {
        let Some(mut state) = self
            .load_and_validate(envelope, SagaStatus::Confirming)
            .await?
        else {
            return Ok(());
        };

        state.add_completed_step(SagaStep::ConfirmOrder);
        self.state_store.save(&state).await?;

        self.execute_step(&mut state, SagaStep::SendNotification, Some(envelope.id))
            .await
    }

    /// Handles `inventory.reservation-failed` and `payments.failed`.
    async fn on_participant_failure(&self, envelope: &EventEnvelope, reason: String) -> Result<()> {
        let correlation_id = &envelope.correlation_id;
        let Some(mut state) = self.state_store.load(correlation_id).await? else {
            self.log_orphan(envelope);
            return Ok(());
        };

        if state.is_terminal() {
            tracing::debug!(status = %state.status, "failure event after terminal status, discarding");
            return Ok(());
        }
        if state.status == SagaStatus::Compensating {
            // Compensation runs at most once per saga.
            tracing::warn!("failure event while already compensating, discarding");
            return Ok(());
        }
        if state.is_timed_out(Utc::now()) {
            return self.force_timeout(&mut state).await;
        }

        self.compensate(&mut state, Some(envelope.id), reason).await
    }

    /// The validation pipeline every success-path event goes through:
    /// orphan check, terminal check, sequence check, lazy timeout check.
    async fn load_and_validate(
        &self,
        envelope: &EventEnvelope,
        expected: SagaStatus,
    ) -> Result<Option<SagaState>> {
        let correlation_id = &envelope.correlation_id;
        let Some(mut state) = self.state_store.load(correlation_id).await? else {
            self.log_orphan(envelope);
            return Ok(None);
        };

        if state.is_terminal() {
            tracing::debug!(
                status = %state.status,
                "event for terminal saga, discarding late duplicate"
            );
            return Ok(None);
        }

        if state.status != expected {
            tracing::warn!(
                current_status = %state.status,
                expected_status = %expected,
                "saga event out of sequence, discarding"
            );
            return Ok(None);
        }

        if state.is_timed_out(Utc::now()) {
            self.force_timeout(&mut state).await?;
            return Ok(None);
        }

        Ok(Some(state))
    }

    fn log_orphan(&self, envelope: &EventEnvelope) {
        tracing::warn!(
            correlation_id = %envelope.correlation_id,
            event_type = envelope.event_type(),
            "event for unknown or expired saga, discarding"
        );
    }

    /// Forces the saga into `TIMED_OUT` and compensates. The triggering
    /// event is discarded by the caller.
    async fn force_timeout(&self, state: &mut SagaState) -> Result<()> {
        tracing::error!(
            correlation_id = %state.correlation_id,
            order_id = %state.order_id,
            "saga timed out"
        );
        state.status = SagaStatus::TimedOut;
        state.last_updated_at = Utc::now();
        self.state_store.save(state).await?;

        self.compensate(state, None, "Saga timed out".to_string())
            .await
    }

    /// Advances the saga by one step: persist the new status, then publish
    /// the step's command event.
    async fn execute_step(
        &self,
        state: &mut SagaState,
        step: SagaStep,
        causation_id: Option<EventId>,
    ) -> Result<()> {
        state.current_step = Some(step);
        state.last_updated_at = Utc::now();

        match step {
            SagaStep::ReserveInventory => {
                state.status = SagaStatus::ReservingInventory;
                self.state_store.save(state).await?;

                self.publish(
                    state,
                    EventPayload::InventoryReserveRequested(InventoryReserveRequestedData {
                        order_id: state.order_id.clone(),
                        items: state.order_snapshot.items.clone(),
                    }),
                    causation_id,
                )
                .await?;
            }
            SagaStep::ProcessPayment => {
                state.status = SagaStatus::ProcessingPayment;
                self.state_store.save(state).await?;

                self.publish(
                    state,
                    EventPayload::PaymentInitiated(PaymentInitiatedData {
                        order_id: state.order_id.clone(),
                        customer_id: state.customer_id.clone(),
                        amount: state.order_snapshot.total_amount,
                        currency: state.order_snapshot.currency.clone(),
                        payment_method: state.order_snapshot.payment_method.clone(),
                    }),
                    causation_id,
                )
                .await?;
            }
            SagaStep::ConfirmOrder => {
                state.status = SagaStatus::Confirming;
                self.state_store.save(state).await?;

                self.publish(
                    state,
                    EventPayload::OrderConfirmed(OrderConfirmedData {
                        order_id: state.order_id.clone(),
                        customer_id: state.customer_id.clone(),
                    }),
                    causation_id,
                )
                .await?;
            }
            SagaStep::SendNotification => {
                // No intermediate status; the saga completes right after
                // the notification command is on its way.
                self.state_store.save(state).await?;

                let variables = HashMap::from([
                    ("orderId".to_string(), serde_json::json!(state.order_id)),
                    (
                        "totalAmount".to_string(),
                        serde_json::json!(state.order_snapshot.total_amount),
                    ),
                    (
                        "currency".to_string(),
                        serde_json::json!(state.order_snapshot.currency),
                    ),
                ]);
                self.publish(
                    state,
                    EventPayload::NotificationSend(NotificationSendData::email(
                        state.customer_id.clone(),
                        "order-confirmed",
                        variables,
                    )),
                    causation_id,
                )
                .await?;

                self.complete(state).await?;
            }
        }

        tracing::info!(step = %step, status = %state.status, "saga step executed");
        Ok(())
    }

    /// Marks the saga completed and schedules state cleanup.
    async fn complete(&self, state: &mut SagaState) -> Result<()> {
        let now = Utc::now();
        state.status = SagaStatus::Completed;
        state.completed_at = Some(now);
        state.last_updated_at = now;
        self.state_store.save(state).await?;

        let duration_seconds = (now - state.started_at)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64();
        metrics::counter!("saga.completed").increment(1);
        metrics::histogram!("saga.duration").record(duration_seconds);
        tracing::info!(
            order_id = %state.order_id,
            duration_seconds,
            "saga completed"
        );

        self.state_store
            .schedule_delete(&state.correlation_id, self.config.terminal_grace)
            .await
    }

    /// Emits compensating events in reverse order of the completed steps,
    /// then cancels the order and notifies the customer.
    ///
    /// Steps map 1:1 to compensations: a step that never completed is
    /// never compensated. Release must run after refund when both apply,
    /// because stock held must stay reserved while its payment is still
    /// open.
    async fn compensate(
        &self,
        state: &mut SagaState,
        causation_id: Option<EventId>,
        reason: String,
    ) -> Result<()> {
        tracing::warn!(
            order_id = %state.order_id,
            completed_steps = ?state.completed_steps,
            %reason,
            "starting saga compensation"
        );

        state.status = SagaStatus::Compensating;
        state.failure_reason = Some(reason.clone());
        state.failed_at = Some(Utc::now());
        state.last_updated_at = Utc::now();
        self.state_store.save(state).await?;
        metrics::counter!("saga.compensating").increment(1);

        let completed = state.completed_steps.clone();
        for step in completed.iter().rev() {
            match step {
                SagaStep::ReserveInventory => {
                    tracing::info!(order_id = %state.order_id, "compensating: releasing stock");
                    self.publish(
                        state,
                        EventPayload::InventoryReleased(InventoryReleasedData {
                            order_id: state.order_id.clone(),
                            items: state.order_snapshot.items.clone(),
                        }),
                        causation_id,
                    )
                    .await?;
                }
                SagaStep::ProcessPayment => {
                    if let Some(payment_id) = state.payment_id.clone() {
                        tracing::info!(%payment_id, "compensating: refunding payment");
                        self.publish(
                            state,
                            EventPayload::PaymentRefunded(PaymentRefundedData {
                                order_id: state.order_id.clone(),
                                payment_id,
                                amount: state.order_snapshot.total_amount,
                                currency: state.order_snapshot.currency.clone(),
                            }),
                            causation_id,
                        )
                        .await?;
                    }
                }
                // Confirmation and notification have no external effect
                // that needs undoing.
                SagaStep::ConfirmOrder | SagaStep::SendNotification => {}
            }
        }

        self.publish(
            state,
            EventPayload::OrderCancelled(OrderCancelledData {
                order_id: state.order_id.clone(),
                customer_id: state.customer_id.clone(),
                reason: reason.clone(),
            }),
            causation_id,
        )
        .await?;

        let variables = HashMap::from([
            ("orderId".to_string(), serde_json::json!(state.order_id)),
            ("reason".to_string(), serde_json::json!(reason)),
        ]);
        self.publish(
            state,
            EventPayload::NotificationSend(NotificationSendData::email(
                state.customer_id.clone(),
                "order-cancelled",
                variables,
            )),
            causation_id,
        )
        .await?;

        state.status = SagaStatus::Compensated;
        state.last_updated_at = Utc::now();
        self.state_store.save(state).await?;
        metrics::counter!("saga.compensated").increment(1);

        self.state_store
            .schedule_delete(&state.correlation_id, self.config.terminal_grace)
            .await?;

        tracing::info!(order_id = %state.order_id, "saga compensated");
        Ok(())
    }

    async fn publish(
        &self,
        state: &SagaState,
        payload: EventPayload,
        causation_id: Option<EventId>,
    ) -> Result<()> {
        let envelope = EventEnvelope::new(
            topics::SOURCE_ORDER_SERVICE,
            state.correlation_id.clone(),
            causation_id,
            payload,
        );
        self.publisher.publish(envelope.topic(), &envelope).await?;
        Ok(())
    }
}
