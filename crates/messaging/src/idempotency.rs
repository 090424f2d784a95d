//! Consumer-side event deduplication.
//!
//! The bus delivers at-least-once: network retries, rebalances and crashes
//! all re-deliver messages. Before processing any event, a consumer checks
//! the guard for its event id. Found means duplicate, skip. Not found
//! means the guard records it and the handler runs.
//!
//! Key format: `idempotency:{topic}:{eventId}`. The atomic set-if-absent
//! collapses the check-then-set window to zero, so no two concurrent
//! consumers can both observe a first-time event.

use std::time::Duration;

use crate::error::KvError;
use crate::kv::KeyValueStore;

const KEY_PREFIX: &str = "idempotency:";

/// Default replay window: long enough to catch duplicates, short enough
/// not to bloat the store.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Deduplicates events by `(topic, event id)` with a bounded TTL.
#[derive(Clone)]
pub struct IdempotencyGuard<K: KeyValueStore> {
    kv: K,
    ttl: Duration,
}

impl<K: KeyValueStore> IdempotencyGuard<K> {
    /// Creates a guard with the default 24-hour TTL.
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            ttl: DEFAULT_TTL,
        }
    }

    /// Creates a guard with a custom default TTL.
    pub fn with_ttl(kv: K, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Checks whether the event was already observed, recording it if not.
    ///
    /// Returns `true` for a duplicate (caller must skip), `false` for a
    /// first-time event (now recorded, caller proceeds).
    pub async fn is_duplicate(&self, event_id: &str, topic: &str) -> Result<bool, KvError> {
        self.is_duplicate_with_ttl(event_id, topic, self.ttl).await
    }

    /// [`is_duplicate`](Self::is_duplicate) with a caller-chosen TTL.
    /// Use a longer TTL for long-running sagas.
    pub async fn is_duplicate_with_ttl(
        &self,
        event_id: &str,
        topic: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let key = Self::key(topic, event_id);
        let newly_set = self.kv.set_if_absent(&key, "1", ttl).await?;

        if !newly_set {
            tracing::debug!(event_id, topic, "duplicate event detected and skipped");
        }
        Ok(!newly_set)
    }

    /// Marks an event as processed without the atomic check.
    ///
    /// For callers that want to record only after downstream success.
    pub async fn mark_processed(&self, event_id: &str, topic: &str) -> Result<(), KvError> {
        self.kv
            .set(&Self::key(topic, event_id), "1", Some(self.ttl))
            .await
    }

    /// Removes an idempotency key, for tests and manual replay.
    pub async fn remove(&self, event_id: &str, topic: &str) -> Result<(), KvError> {
        self.kv.delete(&Self::key(topic, event_id)).await?;
        Ok(())
    }

    fn key(topic: &str, event_id: &str) -> String {
        format!("{KEY_PREFIX}{topic}:{event_id}")
    }
}
