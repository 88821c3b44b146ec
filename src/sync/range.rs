use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::db::{BlockStore, JobQueue};
use crate::models::{BatchRoundResult, BlockBatchJob, ChainHead, SyncWindow};
use crate::sync::executor::WindowRunner;
use crate::sync::{NodeClient, SyncError};

/// Topic downstream transaction sync listens on
pub const DEFAULT_QUEUE_TOPIC: &str = "sync-transactions";

/// Fetches one height range, persists it atomically and hands it downstream.
pub struct RangeSyncer<N, S, Q> {
    node: Arc<N>,
    store: Arc<S>,
    queue: Arc<Q>,
    topic: String,
}

impl<N, S, Q> RangeSyncer<N, S, Q>
where
    N: NodeClient,
    S: BlockStore,
    Q: JobQueue<S::Tx>,
{
    pub fn new(node: Arc<N>, store: Arc<S>, queue: Arc<Q>) -> Self {
        Self {
            node,
            store,
            queue,
            topic: DEFAULT_QUEUE_TOPIC.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        debug!("Downstream jobs go to topic {}", self.topic);
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    /// Sync the blocks in `(window.from, window.to]`.
    pub async fn sync_range(&self, window: SyncWindow) -> Result<BatchRoundResult, SyncError> {
        self.fetch_and_persist(window.from, window.len()).await
    }

    /// Pull the whole gap between `cursor` and `head` in one go, without planning.
    pub async fn sync_missing(&self, cursor: u64, head: &ChainHead) -> Result<BatchRoundResult, SyncError> {
        if head.height <= cursor {
            debug!("No missing blocks: cursor {} at head {}", cursor, head.height);
            return Ok(BatchRoundResult::empty());
        }

        info!("Syncing missing blocks {}..={}", cursor + 1, head.height);
        self.fetch_and_persist(cursor, head.height - cursor).await
    }

    #[instrument(skip(self), fields(topic = %self.topic))]
    async fn fetch_and_persist(&self, after: u64, count: u64) -> Result<BatchRoundResult, SyncError> {
        let page = self.node.fetch_blocks(count, after).await?;
        let result = BatchRoundResult {
            end_cursor: page.end_cursor,
            has_blocks: !page.blocks.is_empty(),
        };

        if !result.has_blocks {
            debug!("Node returned no blocks after {}", after);
            return Ok(result);
        }
        if (page.blocks.len() as u64) < count {
            warn!(
                "Node returned {} of {} requested blocks after {}",
                page.blocks.len(),
                count,
                after
            );
        }

        // Blocks and the downstream job commit together or not at all;
        // returning early drops `tx`, which rolls it back.
        let mut tx = self.store.begin().await?;
        let persisted = self.store.insert_many(&mut tx, &page.blocks).await?;
        let job = BlockBatchJob::new(persisted);
        self.queue.push(&mut tx, &self.topic, &job).await?;
        self.store.commit(tx).await?;

        info!(
            "Persisted {} blocks after {} (end cursor {:?})",
            job.blocks.len(),
            after,
            result.end_cursor
        );
        Ok(result)
    }
}

#[async_trait]
impl<N, S, Q> WindowRunner for RangeSyncer<N, S, Q>
where
    N: NodeClient,
    S: BlockStore,
    Q: JobQueue<S::Tx>,
{
    async fn run_window(&self, window: SyncWindow) -> Result<BatchRoundResult, SyncError> {
        self.sync_range(window).await
    }
}
