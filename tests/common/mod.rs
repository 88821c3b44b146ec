#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use block_sync::models::BlockPage;
use block_sync::{
    BatchQueue, Block, ChainHead, MemoryStore, NodeClient, RangeSyncer, SyncError, SyncJob, SyncMachine,
    SyncSettings,
};

/// Node serving dummy blocks `1..=head`. The head can be moved while a test runs,
/// and head lookups or fetches can be made to fail.
pub struct MockNode {
    head: AtomicU64,
    fetches: AtomicUsize,
    head_down: AtomicBool,
    fail_above: AtomicU64,
}

impl MockNode {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            fetches: AtomicUsize::new(0),
            head_down: AtomicBool::new(false),
            fail_above: AtomicU64::new(u64::MAX),
        }
    }

    pub fn fail_head(&self, down: bool) {
        self.head_down.store(down, Ordering::SeqCst);
    }

    /// Fail any fetch that asks for a height above `height`.
    pub fn fail_fetches_above(&self, height: u64) {
        self.fail_above.store(height, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_head(false);
        self.fail_fetches_above(u64::MAX);
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn latest_head(&self) -> Result<ChainHead, SyncError> {
        if self.head_down.load(Ordering::SeqCst) {
            return Err(SyncError::Provider("head lookup refused".to_string()));
        }
        Ok(ChainHead::from(&Block::dummy(self.head.load(Ordering::SeqCst))))
    }

    async fn fetch_blocks(&self, count: u64, after: u64) -> Result<BlockPage, SyncError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if after.saturating_add(count) > self.fail_above.load(Ordering::SeqCst) {
            return Err(SyncError::Provider(format!("fetch of {} blocks after {} refused", count, after)));
        }
        let last = after.saturating_add(count).min(self.head.load(Ordering::SeqCst));
        Ok(BlockPage::new((after + 1..=last).map(Block::dummy).collect()))
    }
}

pub type TestSyncer = RangeSyncer<MockNode, MemoryStore, BatchQueue>;

pub struct Harness {
    pub node: Arc<MockNode>,
    pub store: Arc<MemoryStore>,
    pub queue: Arc<BatchQueue>,
}

impl Harness {
    pub fn new(head: u64) -> Self {
        Self {
            node: Arc::new(MockNode::new(head)),
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(BatchQueue::with_capacity(1_000)),
        }
    }

    pub fn syncer(&self) -> TestSyncer {
        RangeSyncer::new(self.node.clone(), self.store.clone(), self.queue.clone())
    }

    pub fn machine(&self, job: SyncJob, settings: &SyncSettings) -> SyncMachine<MockNode, MemoryStore, BatchQueue> {
        SyncMachine::new(self.syncer(), job, settings)
    }
}

pub fn job(cursor: u64, offset: u64, limit: u64, watch: bool) -> SyncJob {
    SyncJob {
        cursor: Some(cursor),
        offset: Some(offset),
        limit: Some(limit),
        watch: Some(watch),
    }
}
