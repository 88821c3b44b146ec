use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::debug;

use crate::models::{Block, BlockBatchJob};
use crate::sync::SyncError;

mod blocks;
mod jobs;
mod memory;
mod migrations;

pub use jobs::PgJobQueue;
pub use memory::{MemoryStore, MemoryTx};

/// Durable block storage with caller-driven transactions.
///
/// `insert_many` must be an upsert: re-inserting a height range that is
/// already stored neither duplicates rows nor fails. Dropping a `Tx`
/// without committing rolls it back.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, SyncError>;

    /// Insert `blocks` inside `tx`, returning the rows that were persisted.
    async fn insert_many(&self, tx: &mut Self::Tx, blocks: &[Block]) -> Result<Vec<Block>, SyncError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), SyncError>;
}

/// Downstream hand-off. A push is part of the caller's transaction and is
/// discarded with it on rollback.
#[async_trait]
pub trait JobQueue<Tx: Send>: Send + Sync + 'static {
    async fn push(&self, tx: &mut Tx, topic: &str, job: &BlockBatchJob) -> Result<(), SyncError>;
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(self) -> Result<Self> {
        migrations::run_migrations(&self.pool).await?;
        Ok(self)
    }

    pub async fn get_latest_block_number(&self) -> Result<Option<u64>> {
        blocks::get_latest_block_number(&self.pool).await
    }
}

#[async_trait]
impl BlockStore for Database {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, SyncError> {
        Ok(self.pool.begin().await?)
    }

    async fn insert_many(&self, tx: &mut Self::Tx, batch: &[Block]) -> Result<Vec<Block>, SyncError> {
        let mut persisted = Vec::with_capacity(batch.len());
        for block in batch {
            if let Some(row) = blocks::upsert_block(&mut **tx, block).await? {
                persisted.push(row);
            }
        }
        debug!("Upserted {}/{} blocks", persisted.len(), batch.len());
        Ok(persisted)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), SyncError> {
        tx.commit().await?;
        debug!("Database transaction committed");
        Ok(())
    }
}
