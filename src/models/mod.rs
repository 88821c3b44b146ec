mod batch_queue;
mod block;
mod chain;

pub use batch_queue::{BatchQueue, QueuedJob, Reservation};
pub use block::{Block, BlockBatchJob, Transaction};
pub use chain::{BatchRoundResult, BlockPage, ChainHead, SyncWindow};
