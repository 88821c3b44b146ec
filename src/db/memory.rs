//! In-process block store, used by tests and by embedders that keep the
//! indexed range in memory.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::{BlockStore, JobQueue};
use crate::models::{BatchQueue, Block, BlockBatchJob, QueuedJob};
use crate::sync::SyncError;

/// Staged writes of one in-memory transaction. Nothing is visible until commit.
#[derive(Default)]
pub struct MemoryTx {
    blocks: Vec<Block>,
    jobs: Vec<(BatchQueue, QueuedJob)>,
}

impl MemoryTx {
    pub fn staged_blocks(&self) -> &[Block] {
        &self.blocks
    }
}

/// Block store keyed by height.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<BTreeMap<u64, Block>>,
    failing_heights: Mutex<HashSet<u64>>,
    commits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any `insert_many` containing `height` fail.
    pub async fn fail_on_height(&self, height: u64) {
        self.failing_heights.lock().await.insert(height);
    }

    pub async fn clear_failures(&self) {
        self.failing_heights.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.blocks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.lock().await.is_empty()
    }

    pub async fn heights(&self) -> Vec<u64> {
        self.blocks.lock().await.keys().copied().collect()
    }

    pub async fn get(&self, height: u64) -> Option<Block> {
        self.blocks.lock().await.get(&height).cloned()
    }

    pub async fn latest_height(&self) -> Option<u64> {
        self.blocks.lock().await.keys().next_back().copied()
    }

    /// Number of transactions committed so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, SyncError> {
        Ok(MemoryTx::default())
    }

    async fn insert_many(&self, tx: &mut MemoryTx, batch: &[Block]) -> Result<Vec<Block>, SyncError> {
        let failing = self.failing_heights.lock().await;
        if let Some(block) = batch.iter().find(|b| failing.contains(&b.number)) {
            warn!("Refusing to insert block {}", block.number);
            return Err(SyncError::Store(format!("insert of block {} failed", block.number)));
        }
        drop(failing);

        tx.blocks.extend_from_slice(batch);
        Ok(batch.to_vec())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), SyncError> {
        // Reserve room for every staged job before anything becomes visible;
        // returning early drops the reservations made so far.
        let mut reservations = Vec::new();
        for (queue, jobs) in group_by_queue(tx.jobs) {
            let count = jobs.len();
            match queue.try_reserve(jobs) {
                Some(reservation) => reservations.push(reservation),
                None => {
                    return Err(SyncError::Queue(format!(
                        "queue has no room for {} staged jobs",
                        count
                    )))
                }
            }
        }

        for reservation in reservations {
            reservation.commit();
        }

        let mut blocks = self.blocks.lock().await;
        let staged = tx.blocks.len();
        for block in tx.blocks {
            blocks.insert(block.number, block);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!("Committed {} blocks, {} stored", staged, blocks.len());
        Ok(())
    }
}

fn group_by_queue(staged: Vec<(BatchQueue, QueuedJob)>) -> Vec<(BatchQueue, Vec<QueuedJob>)> {
    let mut groups: Vec<(BatchQueue, Vec<QueuedJob>)> = Vec::new();
    for (queue, job) in staged {
        match groups.iter_mut().find(|(q, _)| q.shares_queue_with(&queue)) {
            Some((_, jobs)) => jobs.push(job),
            None => groups.push((queue, vec![job])),
        }
    }
    groups
}

#[async_trait]
impl JobQueue<MemoryTx> for BatchQueue {
    async fn push(&self, tx: &mut MemoryTx, topic: &str, job: &BlockBatchJob) -> Result<(), SyncError> {
        let queued = QueuedJob {
            topic: topic.to_string(),
            job: job.clone(),
        };
        tx.jobs.push((self.clone_queue(), queued));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commit_applies_blocks_and_jobs() {
        let store = MemoryStore::new();
        let queue = BatchQueue::with_capacity(8);

        let blocks = vec![Block::dummy(1), Block::dummy(2)];
        let mut tx = store.begin().await.unwrap();
        let persisted = store.insert_many(&mut tx, &blocks).await.unwrap();
        JobQueue::push(&queue, &mut tx, "sync-transactions", &BlockBatchJob::new(persisted))
            .await
            .unwrap();

        assert!(store.is_empty().await);
        assert!(queue.is_empty());

        store.commit(tx).await.unwrap();
        assert_eq!(store.heights().await, vec![1, 2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_nothing_behind() {
        let store = MemoryStore::new();
        let queue = BatchQueue::with_capacity(8);

        let mut tx = store.begin().await.unwrap();
        store.insert_many(&mut tx, &[Block::dummy(5)]).await.unwrap();
        JobQueue::push(&queue, &mut tx, "sync-transactions", &BlockBatchJob::new(vec![Block::dummy(5)]))
            .await
            .unwrap();
        drop(tx);

        assert!(store.is_empty().await);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn reinserting_a_range_is_idempotent() {
        let store = MemoryStore::new();
        for _ in 0..2 {
            let mut tx = store.begin().await.unwrap();
            store
                .insert_many(&mut tx, &[Block::dummy(1), Block::dummy(2)])
                .await
                .unwrap();
            store.commit(tx).await.unwrap();
        }
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn injected_failure_rejects_the_batch() {
        let store = MemoryStore::new();
        store.fail_on_height(3).await;

        let mut tx = store.begin().await.unwrap();
        let err = store
            .insert_many(&mut tx, &[Block::dummy(2), Block::dummy(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));
        assert!(tx.staged_blocks().is_empty());
    }

    #[tokio::test]
    async fn full_queue_aborts_commit() {
        let store = MemoryStore::new();
        let queue = BatchQueue::with_capacity(1);
        assert!(queue.try_push(QueuedJob {
            topic: "other".to_string(),
            job: BlockBatchJob::new(vec![]),
        }));

        let mut tx = store.begin().await.unwrap();
        store.insert_many(&mut tx, &[Block::dummy(1)]).await.unwrap();
        JobQueue::push(&queue, &mut tx, "sync-transactions", &BlockBatchJob::new(vec![Block::dummy(1)]))
            .await
            .unwrap();

        let err = store.commit(tx).await.unwrap_err();
        assert!(matches!(err, SyncError::Queue(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn commit_enqueues_all_staged_jobs_or_none() {
        let store = MemoryStore::new();
        let queue = BatchQueue::with_capacity(2);
        assert!(queue.try_push(QueuedJob {
            topic: "other".to_string(),
            job: BlockBatchJob::new(vec![]),
        }));

        let mut tx = store.begin().await.unwrap();
        store.insert_many(&mut tx, &[Block::dummy(1), Block::dummy(2)]).await.unwrap();
        for number in [1, 2] {
            JobQueue::push(&queue, &mut tx, "sync-transactions", &BlockBatchJob::new(vec![Block::dummy(number)]))
                .await
                .unwrap();
        }

        let err = store.commit(tx).await.unwrap_err();
        assert!(matches!(err, SyncError::Queue(_)));
        assert!(store.is_empty().await);
        // Only the job that was already there; neither staged job got through
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.try_push(QueuedJob {
            topic: "other".to_string(),
            job: BlockBatchJob::new(vec![]),
        }));
    }

    #[tokio::test]
    async fn commit_spreads_jobs_over_their_queues() {
        let store = MemoryStore::new();
        let first = BatchQueue::with_capacity(4);
        let second = BatchQueue::with_capacity(4);

        let mut tx = store.begin().await.unwrap();
        store.insert_many(&mut tx, &[Block::dummy(9)]).await.unwrap();
        let job = BlockBatchJob::new(vec![Block::dummy(9)]);
        JobQueue::push(&first, &mut tx, "a", &job).await.unwrap();
        JobQueue::push(&second, &mut tx, "b", &job).await.unwrap();
        JobQueue::push(&first, &mut tx, "a", &job).await.unwrap();
        store.commit(tx).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(store.get(9).await, Some(Block::dummy(9)));
    }
}
