use common::{OrderId, ProductId};
use messaging::{KvError, PublishError};
use outbox::OutboxError;
use thiserror::Error;

/// Errors that can occur inside a participant service.
///
/// A returned error means the triggering message must not be acknowledged;
/// the bus redelivers and the idempotency guard decides what happens next.
#[derive(Debug, Error)]
pub enum ParticipantError {
    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outbound event could not be published.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The key-value store failed.
    #[error(transparent)]
    Kv(#[from] KvError),

    /// The outbox rejected an append.
    #[error(transparent)]
    Outbox(#[from] OutboxError),

    /// A reservation referenced a product that does not exist.
    #[error("Product not found: {0}")]
    UnknownProduct(ProductId),

    /// A status update referenced an unknown order.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A notification named a channel with no registered implementation.
    #[error("No notification channel registered for '{0}'")]
    UnknownChannel(String),

    /// A delivery channel failed.
    #[error("Notification channel error: {0}")]
    Channel(String),
}

/// Convenience type alias for participant results.
pub type Result<T> = std::result::Result<T, ParticipantError>;
