use async_trait::async_trait;
use events::EventId;
use messaging::PublishEvent;

use crate::Result;
use crate::record::OutboxRecord;

/// Outcome of one relay batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Eligible records claimed this batch.
    pub selected: usize,
    /// Records published and marked.
    pub published: usize,
    /// Records whose publish failed; retry scheduled or exhausted.
    pub failed: usize,
}

/// Storage contract for the transactional outbox.
///
/// Implementations must make `relay_batch` safe to run from multiple
/// workers concurrently: a claimed record may only be advanced by the
/// worker that claimed it, and two workers never publish the same record
/// in one pass (the Postgres store uses `FOR UPDATE SKIP LOCKED` for
/// this).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends one record.
    ///
    /// With a transactional backend the append must share the caller's
    /// transaction so the domain write and the event record commit
    /// atomically — see `PostgresOutboxStore::append_in_tx` for that path.
    async fn append(&self, record: OutboxRecord) -> Result<()>;

    /// Claims up to the configured batch of eligible records in creation
    /// order, publishes each to its topic through `publisher`, and updates
    /// its status — all within one atomic unit.
    ///
    /// Publish failures do not abort the batch; they are recorded on the
    /// affected row with an exponential-backoff retry schedule.
    async fn relay_batch(&self, publisher: &dyn PublishEvent) -> Result<RelayReport>;

    /// Number of records not yet published and not yet exhausted.
    async fn unpublished_count(&self) -> Result<u64>;

    /// Fetches a record by id.
    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>>;
}

/// Publishes one claimed record, mutating its status in place.
///
/// Returns `true` when the record was published. Shared by store
/// implementations so memory and Postgres agree on the failure semantics:
/// a payload that no longer deserializes burns a retry like any transient
/// publish error and eventually exhausts.
pub(crate) async fn publish_record(
    record: &mut OutboxRecord,
    publisher: &dyn PublishEvent,
    backoff_base: std::time::Duration,
) -> bool {
    let envelope = match serde_json::from_value(record.payload.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(
                outbox_id = %record.id,
                event_type = %record.event_type,
                error = %e,
                "outbox payload no longer deserializes"
            );
            record.record_failure(e.to_string(), backoff_base);
            return false;
        }
    };

    match publisher.publish(&record.topic, &envelope).await {
        Ok(()) => {
            record.mark_published();
            true
        }
        Err(e) => {
            tracing::error!(
                outbox_id = %record.id,
                event_type = %record.event_type,
                attempt = record.retry_count + 1,
                error = %e,
                "failed to relay outbox record"
            );
            record.record_failure(e.to_string(), backoff_base);
            false
        }
    }
}
