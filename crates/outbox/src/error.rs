use thiserror::Error;

/// Errors raised by outbox stores and the relay.
///
/// Publish failures are not represented here: the relay records them on
/// the affected row (retry count, backoff) instead of propagating.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// An event payload could not be encoded. Programming error; fails the
    /// enclosing transaction.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
