use async_trait::async_trait;
use chrono::{DateTime, Utc};
use events::EventId;
use messaging::PublishEvent;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::Result;
use crate::config::OutboxConfig;
use crate::record::OutboxRecord;
use crate::store::{OutboxStore, RelayReport, publish_record};

/// PostgreSQL-backed outbox store.
///
/// The outbox table lives in the same database as the domain tables, so a
/// domain write and its event record commit in one transaction via
/// [`append_in_tx`](Self::append_in_tx).
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
    config: OutboxConfig,
}

const SELECT_COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, topic, payload, \
     published_at, retry_count, last_error, next_retry_at, created_at, updated_at";

impl PostgresOutboxStore {
    /// Creates a new store over an existing connection pool.
    pub fn new(pool: PgPool, config: OutboxConfig) -> Self {
        Self { pool, config }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Appends a record inside the caller's open transaction.
    ///
    /// This is the write path of the outbox pattern: call it after the
    /// domain INSERT/UPDATE on the same transaction, then commit both
    /// together.
    pub async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        record: &OutboxRecord,
    ) -> Result<()> {
        Self::insert(&mut **tx, record).await
    }

    async fn insert<'e, E>(executor: E, record: &OutboxRecord) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO outbox
                (id, aggregate_id, aggregate_type, event_type, topic, payload,
                 published_at, retry_count, last_error, next_retry_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.aggregate_id)
        .bind(&record.aggregate_type)
        .bind(&record.event_type)
        .bind(&record.topic)
        .bind(&record.payload)
        .bind(record.published_at)
        .bind(record.retry_count)
        .bind(&record.last_error)
        .bind(record.next_retry_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(executor)
        .await?;

        tracing::debug!(
            outbox_id = %record.id,
            event_type = %record.event_type,
            aggregate_id = %record.aggregate_id,
            "outbox record appended"
        );
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<OutboxRecord> {
        Ok(OutboxRecord {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            published_at: row.try_get("published_at")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            next_retry_at: row.try_get("next_retry_at")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(&self, record: OutboxRecord) -> Result<()> {
        Self::insert(&self.pool, &record).await
    }

    async fn relay_batch(&self, publisher: &dyn PublishEvent) -> Result<RelayReport> {
        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED lets multiple relay workers drain disjoint rows
        // without blocking each other; the locks hold until commit, so a
        // claimed row cannot be published twice in one pass.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox
            WHERE published_at IS NULL
              AND retry_count < $1
              AND (next_retry_at IS NULL OR next_retry_at <= $2)
            ORDER BY created_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(self.config.max_retries)
        .bind(Utc::now())
        .bind(self.config.batch_size)
        .fetch_all(&mut *tx)
        .await?;

        let mut report = RelayReport {
            selected: rows.len(),
            ..RelayReport::default()
        };

        for row in rows {
            let mut record = Self::row_to_record(row)?;
            if publish_record(&mut record, publisher, self.config.backoff_base).await {
                report.published += 1;
            } else {
                report.failed += 1;
            }

            sqlx::query(
                r#"
                UPDATE outbox
                SET published_at = $2, retry_count = $3, last_error = $4,
                    next_retry_at = $5, updated_at = $6
                WHERE id = $1
                "#,
            )
            .bind(record.id.as_uuid())
            .bind(record.published_at)
            .bind(record.retry_count)
            .bind(&record.last_error)
            .bind(record.next_retry_at)
            .bind(record.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(report)
    }

    async fn unpublished_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox WHERE published_at IS NULL AND retry_count < $1",
        )
        .bind(self.config.max_retries)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxRecord>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM outbox WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_record).transpose()
    }
}
