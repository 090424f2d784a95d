//! Saga participants: order write side, inventory, payment, notification.
//!
//! Each participant consumes its request topics idempotently and emits
//! exactly one response event per accepted request. State lives in
//! in-memory stores shaped like their durable counterparts (see
//! `migrations/`); the seams (`PaymentGateway`, `NotificationChannel`,
//! `OutboxStore`) are traits so the services can be exercised end to end
//! in tests.

pub mod error;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod payment;

pub use error::{ParticipantError, Result};
pub use inventory::{InMemoryInventoryStore, InventoryParticipant, Reservation, ReservationStatus, StockLevel};
pub use notification::{
    Delivery, NotificationChannel, NotificationContent, NotificationParticipant, RecordingChannel,
    render,
};
pub use order::{CreateOrderCommand, Order, OrderCommandService, OrderStatus};
pub use payment::{
    GatewayDecline, InMemoryPaymentGateway, Payment, PaymentGateway, PaymentParticipant,
    PaymentStatus, Refund,
};
