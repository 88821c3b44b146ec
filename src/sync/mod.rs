mod error;
mod executor;
mod fetcher;
mod machine;
mod planner;
mod range;
mod state;

pub use error::SyncError;
pub use executor::{fold_round, ParallelExecutor, RoundExecutor, SequentialExecutor, WindowRunner};
pub use fetcher::{EthNodeClient, NodeClient};
pub use machine::{SyncJob, SyncMachine, SyncSettings};
pub use planner::plan;
pub use range::{RangeSyncer, DEFAULT_QUEUE_TOPIC};
pub use state::{transition, SyncContext, SyncEvent, SyncState};
