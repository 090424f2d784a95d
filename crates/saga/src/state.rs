//! Saga state machine and its persisted state record.

use chrono::{DateTime, Utc};
use common::{CorrelationId, CustomerId, OrderId, PaymentId};
use events::OrderCreatedData;
use serde::{Deserialize, Serialize};

/// Status of a saga in its lifecycle.
///
/// Transitions:
/// ```text
/// STARTED ──► RESERVING_INVENTORY ──► PROCESSING_PAYMENT ──► CONFIRMING ──► COMPLETED
///     │               │                       │                   │
///     └───────────────┴───────────┬───────────┴───────────────────┘
///                                 ▼
///              COMPENSATING ──► COMPENSATED        (TIMED_OUT, FAILED)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Started,
    ReservingInventory,
    ProcessingPayment,
    Confirming,
    Completed,
    Compensating,
    Compensated,
    Failed,
    TimedOut,
}

impl SagaStatus {
    /// Returns true if no further transitions are possible.
    ///
    /// After a terminal transition, events for the same correlation id
    /// are ignored.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed
                | SagaStatus::Compensated
                | SagaStatus::Failed
                | SagaStatus::TimedOut
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::ReservingInventory => "RESERVING_INVENTORY",
            SagaStatus::ProcessingPayment => "PROCESSING_PAYMENT",
            SagaStatus::Confirming => "CONFIRMING",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::TimedOut => "TIMED_OUT",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The closed set of saga steps, in forward execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStep {
    ReserveInventory,
    ProcessPayment,
    ConfirmOrder,
    SendNotification,
}

impl SagaStep {
    /// The forward execution sequence of the order saga.
    pub const SEQUENCE: [SagaStep; 4] = [
        SagaStep::ReserveInventory,
        SagaStep::ProcessPayment,
        SagaStep::ConfirmOrder,
        SagaStep::SendNotification,
    ];

    /// Returns the step name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::ReserveInventory => "RESERVE_INVENTORY",
            SagaStep::ProcessPayment => "PROCESS_PAYMENT",
            SagaStep::ConfirmOrder => "CONFIRM_ORDER",
            SagaStep::SendNotification => "SEND_NOTIFICATION",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted state of one in-flight saga.
///
/// Serialized as JSON into the external state store. The order snapshot is
/// kept solely so compensation can emit the original items, total and
/// currency without another round trip to the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaState {
    pub correlation_id: CorrelationId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    /// Payload of the triggering `orders.created` event.
    pub order_snapshot: OrderCreatedData,
    pub status: SagaStatus,
    pub current_step: Option<SagaStep>,
    /// Append-only, in execution order.
    pub completed_steps: Vec<SagaStep>,
    pub payment_id: Option<PaymentId>,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub timeout_at: DateTime<Utc>,
}

impl SagaState {
    /// Creates the state for a freshly started saga.
    pub fn start(
        correlation_id: CorrelationId,
        snapshot: OrderCreatedData,
        timeout: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::minutes(5));
        Self {
            correlation_id,
            order_id: snapshot.order_id.clone(),
            customer_id: snapshot.customer_id.clone(),
            order_snapshot: snapshot,
            status: SagaStatus::Started,
            current_step: None,
            completed_steps: Vec::new(),
            payment_id: None,
            failure_reason: None,
            started_at: now,
            last_updated_at: now,
            completed_at: None,
            failed_at: None,
            timeout_at: now + timeout,
        }
    }

    /// Appends a completed step and touches the update timestamp.
    pub fn add_completed_step(&mut self, step: SagaStep) {
        self.completed_steps.push(step);
        self.last_updated_at = Utc::now();
    }

    /// True if the saga has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True if `step` has already completed.
    pub fn has_completed_step(&self, step: SagaStep) -> bool {
        self.completed_steps.contains(&step)
    }

    /// True once the wall clock has passed the saga deadline.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        now > self.timeout_at
    }
}
