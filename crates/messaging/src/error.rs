use thiserror::Error;

/// Errors raised by the bus transport.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker rejected or failed to acknowledge a publish.
    #[error("Broker publish failed: {0}")]
    Publish(String),

    /// The transport is unavailable.
    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the key-value store.
#[derive(Debug, Error)]
pub enum KvError {
    /// The backing store failed.
    #[error("Key-value store error: {0}")]
    Backend(String),
}

/// Errors raised when publishing an event envelope.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The envelope could not be encoded. Programming error.
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The bus publish failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}
