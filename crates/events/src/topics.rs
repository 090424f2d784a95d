//! Canonical topic names and event sources.
//!
//! Topic name equals event type. All services must use these constants;
//! changing one is a breaking change requiring consumer updates.

// ── Order domain ───────────────────────────────────────────────────────────
pub const ORDERS_CREATED: &str = "orders.created";
pub const ORDERS_CONFIRMED: &str = "orders.confirmed";
pub const ORDERS_CANCELLED: &str = "orders.cancelled";

// ── Payment domain ─────────────────────────────────────────────────────────
pub const PAYMENTS_INITIATED: &str = "payments.initiated";
pub const PAYMENTS_COMPLETED: &str = "payments.completed";
pub const PAYMENTS_FAILED: &str = "payments.failed";
pub const PAYMENTS_REFUNDED: &str = "payments.refunded";

// ── Inventory domain ───────────────────────────────────────────────────────
pub const INVENTORY_RESERVE_REQUESTED: &str = "inventory.reserve-requested";
pub const INVENTORY_RESERVED: &str = "inventory.reserved";
pub const INVENTORY_RESERVATION_FAILED: &str = "inventory.reservation-failed";
pub const INVENTORY_RELEASED: &str = "inventory.released";

// ── Notification domain ────────────────────────────────────────────────────
pub const NOTIFICATIONS_SEND: &str = "notifications.send";

// ── Dead-letter queues ─────────────────────────────────────────────────────
pub const DLQ_ORDERS: &str = "dlq.orders";
pub const DLQ_PAYMENTS: &str = "dlq.payments";
pub const DLQ_INVENTORY: &str = "dlq.inventory";

// ── Event sources ──────────────────────────────────────────────────────────
// Each envelope's `source` names the service that actually emitted it.
pub const SOURCE_ORDER_SERVICE: &str = "/services/order-service";
pub const SOURCE_INVENTORY_SERVICE: &str = "/services/inventory-service";
pub const SOURCE_PAYMENT_SERVICE: &str = "/services/payment-service";
pub const SOURCE_NOTIFICATION_SERVICE: &str = "/services/notification-service";
