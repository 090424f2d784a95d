use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use events::EventId;
use messaging::PublishEvent;
use tokio::sync::RwLock;

use crate::config::OutboxConfig;
use crate::record::OutboxRecord;
use crate::Result;
use crate::store::{OutboxStore, RelayReport, publish_record};

/// In-memory outbox store for testing.
///
/// A single write lock spans claim, publish and status update, which gives
/// the same "one worker per record per pass" property the Postgres store
/// gets from `FOR UPDATE SKIP LOCKED`.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    config: OutboxConfig,
    records: Arc<RwLock<Vec<OutboxRecord>>>,
}

impl InMemoryOutboxStore {
    /// Creates a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(OutboxConfig::default())
    }

    /// Creates a store with an explicit configuration.
    pub fn with_config(config: OutboxConfig) -> Self {
        Self {
            config,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Returns a snapshot of all records.
    pub async fn records(&self) -> Vec<OutboxRecord> {
        self.records.read().await.clone()
    }

    /// Number of records that have exhausted their retries unpublished.
    pub async fn exhausted_count(&self) -> usize {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| !r.is_published() && r.is_exhausted(self.config.max_retries))
            .count()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, record: OutboxRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn relay_batch(&self, publisher: &dyn PublishEvent) -> Result<RelayReport> {
        let mut records = self.records.write().await;
        let now = Utc::now();

        let mut eligible: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_eligible(now, self.config.max_retries))
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by_key(|&i| records[i].created_at);
        eligible.truncate(self.config.batch_size as usize);

        let mut report = RelayReport {
            selected: eligible.len(),
            ..RelayReport::default()
        };

        for index in eligible {
            let record = &mut records[index];
            if publish_record(record, publisher, self.config.backoff_base).await {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        Ok(report)
    }

    async fn unpublished_count(&self) -> Result<u64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| !r.is_published() && !r.is_exhausted(self.config.max_retries))
            .count() as u64)
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}
