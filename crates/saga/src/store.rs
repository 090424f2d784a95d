//! External saga state persistence.
//!
//! The orchestrator is stateless; everything needed to resume a saga after
//! a crash lives here, keyed by `saga:order:{correlationId}` with a TTL
//! that outlives the saga timeout by a grace period.

use std::time::Duration;

use common::CorrelationId;
use messaging::KeyValueStore;

use crate::Result;
use crate::state::SagaState;

const KEY_PREFIX: &str = "saga:order:";

/// Key-value-backed store for [`SagaState`].
#[derive(Clone)]
pub struct SagaStateStore<K: KeyValueStore> {
    kv: K,
    ttl: Duration,
}

impl<K: KeyValueStore> SagaStateStore<K> {
    /// Creates a store writing states with the given TTL.
    pub fn new(kv: K, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    /// Persists the state, resetting its TTL.
    ///
    /// A state that cannot be serialized is a programming error and fails
    /// the operation.
    pub async fn save(&self, state: &SagaState) -> Result<()> {
        let key = Self::key(&state.correlation_id);
        let json = serde_json::to_string(state)?;
        self.kv.set(&key, &json, Some(self.ttl)).await?;

        tracing::debug!(
            correlation_id = %state.correlation_id,
            status = %state.status,
            "saga state saved"
        );
        Ok(())
    }

    /// Loads the current state, or `None` when absent or expired.
    ///
    /// A value that no longer deserializes is logged and reported as
    /// absent; the orchestrator then treats the saga as orphaned.
    pub async fn load(&self, correlation_id: &CorrelationId) -> Result<Option<SagaState>> {
        let Some(json) = self.kv.get(&Self::key(correlation_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "failed to deserialize saga state"
                );
                Ok(None)
            }
        }
    }

    /// Removes the state immediately.
    pub async fn delete(&self, correlation_id: &CorrelationId) -> Result<()> {
        self.kv.delete(&Self::key(correlation_id)).await?;
        Ok(())
    }

    /// Schedules removal after `delay` by rewriting the TTL.
    ///
    /// Used to keep terminal sagas visible briefly for debugging.
    pub async fn schedule_delete(
        &self,
        correlation_id: &CorrelationId,
        delay: Duration,
    ) -> Result<()> {
        self.kv.expire(&Self::key(correlation_id), delay).await?;
        Ok(())
    }

    fn key(correlation_id: &CorrelationId) -> String {
        format!("{KEY_PREFIX}{correlation_id}")
    }
}
