//! Strategies for running the windows of one round.
//!
//! Both executors report one result per window they started, in plan order,
//! never in completion order. Callers rely on that to pick the round's cursor.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info};

use crate::models::{BatchRoundResult, SyncWindow};
use crate::sync::SyncError;

/// Runs a single window to completion.
#[async_trait]
pub trait WindowRunner: Send + Sync {
    async fn run_window(&self, window: SyncWindow) -> Result<BatchRoundResult, SyncError>;
}

#[async_trait]
pub trait RoundExecutor: Send + Sync {
    async fn execute(
        &self,
        runner: &dyn WindowRunner,
        windows: &[SyncWindow],
    ) -> Vec<Result<BatchRoundResult, SyncError>>;

    fn name(&self) -> &'static str;
}

/// Runs windows concurrently, at most `max_concurrent` in flight.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    max_concurrent: usize,
}

impl ParallelExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            max_concurrent: usize::MAX,
        }
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl RoundExecutor for ParallelExecutor {
    async fn execute(
        &self,
        runner: &dyn WindowRunner,
        windows: &[SyncWindow],
    ) -> Vec<Result<BatchRoundResult, SyncError>> {
        debug!(
            "Running {} windows with up to {} in flight",
            windows.len(),
            self.max_concurrent.min(windows.len())
        );

        // `buffered` keeps output in input order
        stream::iter(windows.iter().copied())
            .map(|window| async move {
                let result = runner.run_window(window).await;
                if let Err(e) = &result {
                    error!("Window ({}, {}] failed: {}", window.from, window.to, e);
                }
                result
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// Runs windows one after another and stops at the first failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

#[async_trait]
impl RoundExecutor for SequentialExecutor {
    async fn execute(
        &self,
        runner: &dyn WindowRunner,
        windows: &[SyncWindow],
    ) -> Vec<Result<BatchRoundResult, SyncError>> {
        let mut results = Vec::with_capacity(windows.len());
        for (idx, window) in windows.iter().enumerate() {
            let result = runner.run_window(*window).await;
            let failed = result.is_err();
            if let Err(e) = &result {
                error!("Window ({}, {}] failed: {}", window.from, window.to, e);
            }
            results.push(result);

            if failed {
                info!("Skipping {} remaining windows after failure", windows.len() - idx - 1);
                break;
            }
        }
        results
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Fold per-window results into the round's outcome.
///
/// Returns the last committed result before the first failure (if any) and
/// the failure itself. Without failures the round result is the last window's.
pub fn fold_round(
    results: Vec<Result<BatchRoundResult, SyncError>>,
) -> (Option<BatchRoundResult>, Option<SyncError>) {
    let mut committed = None;
    for result in results {
        match result {
            Ok(r) => committed = Some(r),
            Err(e) => return (committed, Some(e)),
        }
    }
    (committed, None)
}
