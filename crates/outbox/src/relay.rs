//! Background relay: polls the outbox and forwards records to the bus.

use std::time::Duration;

use messaging::PublishEvent;

use crate::Result;
use crate::store::{OutboxStore, RelayReport};

/// Periodically drains eligible outbox records to the bus.
///
/// Fixed-delay scheduling: the next tick starts `poll_interval` after the
/// previous one completes, so a slow batch never overlaps the next.
/// Multiple relay instances may run concurrently against the same store;
/// the store's claim semantics keep them off each other's rows.
pub struct OutboxRelay<S, P>
where
    S: OutboxStore,
    P: PublishEvent,
{
    store: S,
    publisher: P,
    poll_interval: Duration,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxStore,
    P: PublishEvent,
{
    /// Creates a new relay.
    pub fn new(store: S, publisher: P, poll_interval: Duration) -> Self {
        Self {
            store,
            publisher,
            poll_interval,
        }
    }

    /// Runs one relay pass.
    pub async fn tick(&self) -> Result<RelayReport> {
        let report = self.store.relay_batch(&self.publisher).await?;

        if report.selected > 0 {
            metrics::counter!("outbox.records.relayed").increment(report.published as u64);
            metrics::counter!("outbox.relay.errors").increment(report.failed as u64);
            tracing::debug!(
                selected = report.selected,
                published = report.published,
                failed = report.failed,
                "outbox relay tick"
            );
        }

        Ok(report)
    }

    /// Runs the relay until the task is dropped or aborted.
    ///
    /// Store-level errors are logged and retried on the next tick; the
    /// loop never gives up.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.tick().await {
                metrics::counter!("outbox.relay.errors").increment(1);
                tracing::error!(error = %e, "outbox relay tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
