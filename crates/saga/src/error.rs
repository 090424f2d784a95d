//! Saga error types.

use messaging::{KvError, PublishError};
use thiserror::Error;

/// Errors that can occur while orchestrating a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Saga state could not be encoded. Programming error; fails loudly.
    #[error("Failed to serialize saga state: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The external state store failed.
    #[error("Saga state store error: {0}")]
    StateStore(#[from] KvError),

    /// An outbound event could not be published.
    #[error("Failed to publish saga event: {0}")]
    Publish(#[from] PublishError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
