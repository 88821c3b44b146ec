//! Block synchronization pipeline for a chain indexer.
//!
//! Blocks are fetched from a node in bounded windows, persisted together with
//! a downstream job in one transaction, and the cursor follows the chain head
//! until caught up, after which the machine keeps polling in watch mode.

pub mod config;
pub mod db;
pub mod models;
pub mod sync;
pub mod utils;

pub use db::{BlockStore, Database, JobQueue, MemoryStore, PgJobQueue};
pub use models::{BatchQueue, BatchRoundResult, Block, BlockBatchJob, ChainHead, SyncWindow};
pub use sync::{
    EthNodeClient, NodeClient, ParallelExecutor, RangeSyncer, RoundExecutor, SequentialExecutor, SyncError,
    SyncJob, SyncMachine, SyncSettings, SyncState,
};
