//! Inventory participant.
//!
//! Reserves stock for `inventory.reserve-requested` and releases it for
//! `inventory.released`. Stock rows use optimistic concurrency: every
//! write bumps a version, a reserve attempt retries a bounded number of
//! times on version conflict, and conflicts that never resolve are
//! reported as insufficient stock rather than retried forever.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use common::{OrderId, ProductId};
use events::{
    EventEnvelope, EventPayload, InventoryReleasedData, InventoryReservationFailedData,
    InventoryReserveRequestedData, InventoryReservedData, OrderItem, topics,
};
use messaging::PublishEvent;

use crate::error::{ParticipantError, Result};

const MAX_OPTIMISTIC_RETRIES: u32 = 3;

/// One product's stock position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub available: u32,
    pub reserved: u32,
    /// Bumped on every write; reserve attempts compare-and-swap on it.
    pub version: u64,
}

/// Status of a per-order reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Reserved,
    Released,
}

/// A reservation row keyed by order id.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub status: ReservationStatus,
}

#[derive(Default)]
struct InventoryState {
    stock: HashMap<ProductId, StockLevel>,
    reservations: HashMap<OrderId, Reservation>,
}

/// In-memory inventory storage with versioned stock rows.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the available quantity for a product.
    pub fn set_stock(&self, product_id: impl Into<ProductId>, available: u32) {
        let product_id = product_id.into();
        self.state.write().unwrap().stock.insert(
            product_id.clone(),
            StockLevel {
                product_id,
                available,
                reserved: 0,
                version: 0,
            },
        );
    }

    /// Returns the current stock row for a product.
    pub fn stock(&self, product_id: &ProductId) -> Option<StockLevel> {
        self.state.read().unwrap().stock.get(product_id).cloned()
    }

    /// Returns the reservation for an order, if any.
    pub fn reservation(&self, order_id: &OrderId) -> Option<Reservation> {
        self.state
            .read()
            .unwrap()
            .reservations
            .get(order_id)
            .cloned()
    }

    fn load_stock(&self, product_id: &ProductId) -> Option<StockLevel> {
        self.state.read().unwrap().stock.get(product_id).cloned()
    }

    /// Stores `updated` only if the row version is still `expected_version`.
    ///
    /// Returns false on a version conflict, in which case the caller
    /// re-reads and retries.
    fn store_if_version(&self, mut updated: StockLevel, expected_version: u64) -> bool {
        let mut state = self.state.write().unwrap();
        match state.stock.get(&updated.product_id) {
            Some(current) if current.version == expected_version => {
                updated.version = expected_version + 1;
                state.stock.insert(updated.product_id.clone(), updated);
                true
            }
            _ => false,
        }
    }

    /// Returns `quantity` units of a product to the shelf. The reserved
    /// counter clamps at zero.
    fn release_stock(&self, product_id: &ProductId, quantity: u32) {
        let mut state = self.state.write().unwrap();
        if let Some(stock) = state.stock.get_mut(product_id) {
            stock.available += quantity;
            stock.reserved = stock.reserved.saturating_sub(quantity);
            stock.version += 1;
        }
    }

    fn save_reservation(&self, reservation: Reservation) {
        self.state
            .write()
            .unwrap()
            .reservations
            .insert(reservation.order_id.clone(), reservation);
    }

    fn set_reservation_status(&self, order_id: &OrderId, status: ReservationStatus) {
        let mut state = self.state.write().unwrap();
        if let Some(reservation) = state.reservations.get_mut(order_id) {
            reservation.status = status;
        }
    }
}

enum ReserveItemOutcome {
    Reserved,
    Insufficient,
}

/// Handles inventory request events and emits the response events.
#[derive(Clone)]
pub struct InventoryParticipant<P: PublishEvent> {
    store: InMemoryInventoryStore,
    publisher: P,
}

impl<P: PublishEvent> InventoryParticipant<P> {
    /// Creates a participant over the given store and publisher.
    pub fn new(store: InMemoryInventoryStore, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &InMemoryInventoryStore {
        &self.store
    }

    /// Routes one inbound event.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match &envelope.payload {
            EventPayload::InventoryReserveRequested(data) => self.reserve(envelope, data).await,
            EventPayload::InventoryReleased(data) => self.release(data),
            _ => {
                tracing::debug!(
                    event_type = envelope.event_type(),
                    "event is not an inventory input, ignoring"
                );
                Ok(())
            }
        }
    }

    /// Reserves stock for all order items.
    ///
    /// Either every item is reserved and `inventory.reserved` is emitted,
    /// or the partial reservations of this attempt are rolled back and
    /// `inventory.reservation-failed` lists the offending products.
    async fn reserve(
        &self,
        envelope: &EventEnvelope,
        data: &InventoryReserveRequestedData,
    ) -> Result<()> {
        // Idempotency on top of the event-id guard: a reservation row for
        // this order means the request was already fulfilled.
        if self.store.reservation(&data.order_id).is_some() {
            tracing::info!(order_id = %data.order_id, "duplicate reservation request, skipping");
            return Ok(());
        }

        let mut insufficient: Vec<ProductId> = Vec::new();
        let mut reserved_so_far: Vec<OrderItem> = Vec::new();

        for item in &data.items {
            match self.try_reserve_item(item).await {
                Ok(ReserveItemOutcome::Reserved) => reserved_so_far.push(item.clone()),
                Ok(ReserveItemOutcome::Insufficient) => {
                    insufficient.push(item.product_id.clone());
                }
                Err(e) => {
                    // Unknown product is a poison request: undo this
                    // attempt and let the bus error handler deal with it.
                    self.rollback(&reserved_so_far);
                    return Err(e);
                }
            }
        }

        if insufficient.is_empty() {
            self.store.save_reservation(Reservation {
                order_id: data.order_id.clone(),
                items: data.items.clone(),
                status: ReservationStatus::Reserved,
            });

            self.publish(
                envelope,
                EventPayload::InventoryReserved(InventoryReservedData {
                    order_id: data.order_id.clone(),
                    items: data.items.clone(),
                }),
            )
            .await?;
            tracing::info!(order_id = %data.order_id, "inventory reserved");
        } else {
            self.rollback(&reserved_so_far);

            self.publish(
                envelope,
                EventPayload::InventoryReservationFailed(InventoryReservationFailedData {
                    order_id: data.order_id.clone(),
                    reason: "Insufficient stock".to_string(),
                    insufficient_product_ids: insufficient.clone(),
                }),
            )
            .await?;
            tracing::warn!(
                order_id = %data.order_id,
                insufficient_products = ?insufficient,
                "inventory reservation failed"
            );
        }

        Ok(())
    }

    /// Reserve one line item under optimistic concurrency.
    async fn try_reserve_item(&self, item: &OrderItem) -> Result<ReserveItemOutcome> {
        for attempt in 0..MAX_OPTIMISTIC_RETRIES {
            let Some(mut stock) = self.store.load_stock(&item.product_id) else {
                return Err(ParticipantError::UnknownProduct(item.product_id.clone()));
            };
            let expected_version = stock.version;

            if stock.available < item.quantity {
                return Ok(ReserveItemOutcome::Insufficient);
            }
            stock.available -= item.quantity;
            stock.reserved += item.quantity;

            if self.store.store_if_version(stock, expected_version) {
                return Ok(ReserveItemOutcome::Reserved);
            }

            tracing::debug!(
                product_id = %item.product_id,
                attempt = attempt + 1,
                "optimistic lock conflict on stock row"
            );
            // 10, 20, 30 ms between attempts.
            tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt + 1))).await;
        }

        // Conflicts never resolved; report as insufficient rather than
        // blocking the saga forever.
        Ok(ReserveItemOutcome::Insufficient)
    }

    fn rollback(&self, reserved: &[OrderItem]) {
        for item in reserved {
            self.store.release_stock(&item.product_id, item.quantity);
        }
    }

    /// Releases a reservation (saga compensation). Already-released and
    /// unknown reservations are no-ops.
    fn release(&self, data: &InventoryReleasedData) -> Result<()> {
        let Some(reservation) = self.store.reservation(&data.order_id) else {
            tracing::warn!(order_id = %data.order_id, "release for unknown reservation, ignoring");
            return Ok(());
        };
        if reservation.status == ReservationStatus::Released {
            tracing::info!(order_id = %data.order_id, "inventory already released");
            return Ok(());
        }

        for item in &data.items {
            self.store.release_stock(&item.product_id, item.quantity);
        }
        self.store
            .set_reservation_status(&data.order_id, ReservationStatus::Released);

        tracing::info!(order_id = %data.order_id, "inventory released");
        Ok(())
    }

    async fn publish(&self, cause: &EventEnvelope, payload: EventPayload) -> Result<()> {
        let envelope = EventEnvelope::new(
            topics::SOURCE_INVENTORY_SERVICE,
            cause.correlation_id.clone(),
            Some(cause.id),
            payload,
        );
        self.publisher.publish(envelope.topic(), &envelope).await?;
        Ok(())
    }
}
