use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use tracing::{debug, error, instrument};

use crate::db::JobQueue;
use crate::models::BlockBatchJob;
use crate::sync::SyncError;

/// Outbox-style queue: jobs are rows in `sync_jobs`, written on the same
/// transaction as the blocks they describe. A trigger notifies listeners
/// on the `sync_jobs` channel once the row is committed.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgJobQueue;

impl PgJobQueue {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobQueue<Transaction<'static, Postgres>> for PgJobQueue {
    #[instrument(skip(self, tx, job), fields(blocks = job.blocks.len()))]
    async fn push(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        topic: &str,
        job: &BlockBatchJob,
    ) -> Result<(), SyncError> {
        let (first_block, last_block) = match job.span() {
            Some((first, last)) => (Some(first as i64), Some(last as i64)),
            None => (None, None),
        };

        let payload = serde_json::to_value(job)?;

        sqlx::query(
            r#"
            INSERT INTO sync_jobs (topic, payload, first_block, last_block)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(topic)
        .bind(payload)
        .bind(first_block)
        .bind(last_block)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            error!("Failed to enqueue job for topic {}: {}", topic, e);
            e
        })?;

        debug!("Enqueued job for topic {} covering {:?}", topic, job.span());
        Ok(())
    }
}
