use crate::models::BlockBatchJob;
use crossbeam_queue::SegQueue;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Maximum number of jobs that can be in the queue
const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// A downstream job tagged with the topic it was pushed to
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedJob {
    pub topic: String,
    pub job: BlockBatchJob,
}

/// Bounded in-process queue handing persisted batches to the downstream stage
pub struct BatchQueue {
    /// The actual queue holding jobs
    queue: Arc<SegQueue<QueuedJob>>,
    /// Semaphore to limit the queue size
    semaphore: Arc<Semaphore>,
    /// Maximum queue size
    max_size: usize,
}

impl BatchQueue {
    /// Create a new queue with the default max size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_QUEUE_SIZE)
    }

    /// Create a new queue with a specific capacity
    pub fn with_capacity(max_size: usize) -> Self {
        info!("Creating batch queue with capacity {}", max_size);
        Self {
            queue: Arc::new(SegQueue::new()),
            semaphore: Arc::new(Semaphore::new(max_size)),
            max_size,
        }
    }

    /// Get the current queue length, counting reserved slots
    pub fn len(&self) -> usize {
        // SegQueue::len walks the segments, the permit count is exact enough
        self.max_size - self.semaphore.available_permits()
    }

    pub fn is_empty(&self) -> bool {
        self.semaphore.available_permits() == self.max_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Push a job, waiting while the queue is full
    pub async fn push(&self, job: QueuedJob) -> Result<(), tokio::sync::AcquireError> {
        let permit = self.semaphore.acquire().await?;
        self.queue.push(job);
        self.log_size();

        // The permit is handed back in try_pop
        permit.forget();
        Ok(())
    }

    /// Push a job, returning `false` immediately if the queue is full
    pub fn try_push(&self, job: QueuedJob) -> bool {
        match self.semaphore.try_acquire() {
            Ok(permit) => {
                self.queue.push(job);
                self.log_size();
                permit.forget();
                true
            }
            Err(_) => {
                warn!("Batch queue is full, cannot push job for topic {}", job.topic);
                false
            }
        }
    }

    /// Try to pop a job, returning None if the queue is empty
    pub fn try_pop(&self) -> Option<QueuedJob> {
        let job = self.queue.pop()?;
        self.semaphore.add_permits(1);
        Some(job)
    }

    /// Drain every job currently queued
    pub fn drain(&self) -> Vec<QueuedJob> {
        std::iter::from_fn(|| self.try_pop()).collect()
    }

    /// Reserve slots for all of `jobs` at once, or for none of them.
    ///
    /// The jobs only become visible on [`Reservation::commit`]; dropping the
    /// reservation hands the slots back.
    pub fn try_reserve(&self, jobs: Vec<QueuedJob>) -> Option<Reservation> {
        let slots = u32::try_from(jobs.len()).ok()?;
        match Arc::clone(&self.semaphore).try_acquire_many_owned(slots) {
            Ok(permit) => Some(Reservation {
                queue: self.clone_queue(),
                permit,
                jobs,
            }),
            Err(_) => {
                warn!(
                    "Batch queue has {} free slots, cannot reserve {}",
                    self.semaphore.available_permits(),
                    slots
                );
                None
            }
        }
    }

    /// Whether both handles point at the same underlying queue
    pub fn shares_queue_with(&self, other: &BatchQueue) -> bool {
        Arc::ptr_eq(&self.queue, &other.queue)
    }

    /// Get a handle sharing the same underlying queue
    pub fn clone_queue(&self) -> BatchQueue {
        Self {
            queue: Arc::clone(&self.queue),
            semaphore: Arc::clone(&self.semaphore),
            max_size: self.max_size,
        }
    }

    fn log_size(&self) {
        let current_size = self.len();
        if current_size % 100 == 0 || current_size + 10 >= self.max_size {
            info!("Batch queue size: {}/{}", current_size, self.max_size);
        } else {
            debug!("Batch queue size: {}/{}", current_size, self.max_size);
        }
    }
}

/// Slots held in a [`BatchQueue`] for a group of jobs
pub struct Reservation {
    queue: BatchQueue,
    permit: OwnedSemaphorePermit,
    jobs: Vec<QueuedJob>,
}

impl Reservation {
    /// Publish the reserved jobs
    pub fn commit(self) {
        let Reservation { queue, permit, jobs } = self;
        for job in jobs {
            queue.queue.push(job);
        }
        // Slots are handed back one by one in try_pop
        permit.forget();
        queue.log_size();
    }
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}
