use serde::Deserialize;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::db::{BlockStore, JobQueue};
use crate::models::BatchRoundResult;
use crate::sync::executor::{fold_round, ParallelExecutor, RoundExecutor};
use crate::sync::planner::plan;
use crate::sync::range::RangeSyncer;
use crate::sync::state::{transition, SyncContext, SyncEvent, SyncState};
use crate::sync::{NodeClient, SyncError};
use crate::utils::time::{format_duration, format_rate};

/// Defaults applied to whatever a [`SyncJob`] leaves out.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub offset: u64,
    pub limit: u64,
    pub watch: bool,
    pub watch_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            offset: 10,
            limit: 100,
            watch: true,
            watch_interval: Duration::from_secs(1),
        }
    }
}

/// Input of one sync job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncJob {
    pub cursor: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub watch: Option<bool>,
}

impl SyncJob {
    pub fn from_cursor(cursor: u64) -> Self {
        Self {
            cursor: Some(cursor),
            ..Self::default()
        }
    }

    /// Parse a job payload such as `{"cursor": 100, "watch": false}`.
    pub fn from_json(payload: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(payload)?)
    }

    fn into_context(self, settings: &SyncSettings) -> SyncContext {
        SyncContext::new(
            self.cursor.unwrap_or(0),
            self.offset.unwrap_or(settings.offset),
            self.limit.unwrap_or(settings.limit),
            self.watch.unwrap_or(settings.watch),
        )
    }
}

/// Drives block synchronization: catch up to the head in rounds, then keep
/// polling for new blocks when watch mode is on.
pub struct SyncMachine<N, S, Q> {
    syncer: RangeSyncer<N, S, Q>,
    executor: Box<dyn RoundExecutor>,
    state: SyncState,
    ctx: SyncContext,
    watch_interval: Duration,
}

impl<N, S, Q> SyncMachine<N, S, Q>
where
    N: NodeClient,
    S: BlockStore,
    Q: JobQueue<S::Tx>,
{
    pub fn new(syncer: RangeSyncer<N, S, Q>, job: SyncJob, settings: &SyncSettings) -> Self {
        let ctx = job.into_context(settings);
        info!(
            cursor = ctx.cursor,
            offset = ctx.offset,
            limit = ctx.limit,
            watch = ctx.watch,
            "Created sync machine"
        );
        Self {
            syncer,
            executor: Box::new(ParallelExecutor::default()),
            state: SyncState::Idle,
            ctx,
            watch_interval: settings.watch_interval,
        }
    }

    /// Replace the round executor
    pub fn with_executor(mut self, executor: Box<dyn RoundExecutor>) -> Self {
        info!("Using {} round executor", executor.name());
        self.executor = executor;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn cursor(&self) -> u64 {
        self.ctx.cursor
    }

    /// Send the start signal.
    pub fn start(&mut self) -> Result<(), SyncError> {
        self.apply(SyncEvent::Start)
    }

    /// Run the current state's entry action and take the resulting transition.
    ///
    /// Stepping while idle does nothing.
    pub async fn step(&mut self) -> Result<SyncState, SyncError> {
        let event = match self.state {
            SyncState::Idle => return Ok(SyncState::Idle),
            SyncState::GettingLastBlock => SyncEvent::HeadFetched(self.syncer.node().latest_head().await?),
            SyncState::SyncingBlocks => SyncEvent::RoundCompleted(self.sync_round().await?),
            SyncState::Checking => SyncEvent::Decide,
            SyncState::Waiting => {
                sleep(self.watch_interval).await;
                SyncEvent::TimerElapsed
            }
            SyncState::SyncingMissingBlocks => {
                let head = self.syncer.node().latest_head().await?;
                SyncEvent::MissingSynced(self.syncer.sync_missing(self.ctx.cursor, &head).await?)
            }
            SyncState::ResettingLastBlock => SyncEvent::HeadReset(self.syncer.node().latest_head().await?),
        };

        self.apply(event)?;
        Ok(self.state)
    }

    /// Start and drive the machine until it returns to idle.
    ///
    /// With watch mode on this only returns on failure. Failures are wrapped
    /// with the cursor reached and leave the machine idle, ready to restart.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        match self.drive().await {
            Ok(()) => {
                info!(cursor = self.ctx.cursor, "Sync machine finished");
                Ok(())
            }
            Err(e) => {
                error!(cursor = self.ctx.cursor, state = %self.state, "Block synchronization failed: {}", e);
                self.state = SyncState::Idle;
                Err(SyncError::wrap(self.ctx.cursor, e))
            }
        }
    }

    async fn drive(&mut self) -> Result<(), SyncError> {
        self.start()?;
        while self.state != SyncState::Idle {
            self.step().await?;
        }
        Ok(())
    }

    fn apply(&mut self, event: SyncEvent) -> Result<(), SyncError> {
        let previous = self.state;
        let next = transition(previous, event, &mut self.ctx)?;
        if previous != next {
            info!(from = %previous, to = %next, cursor = self.ctx.cursor, "State transition");
        }
        self.state = next;
        Ok(())
    }

    /// Plan and execute one round. On a failed window the cursor still moves
    /// up to the committed windows before it.
    async fn sync_round(&mut self) -> Result<BatchRoundResult, SyncError> {
        let windows = plan(self.ctx.cursor, self.ctx.offset, self.ctx.limit, self.ctx.head.as_ref());
        let head = self.ctx.head.as_ref().map(|h| h.height).unwrap_or(0);

        if windows.is_empty() {
            info!(cursor = self.ctx.cursor, head, "All blocks synced");
            return Ok(BatchRoundResult::empty());
        }

        info!(
            cursor = self.ctx.cursor,
            head,
            windows = windows.len(),
            executor = self.executor.name(),
            "Starting sync round"
        );

        let started = Instant::now();
        let results = self.executor.execute(&self.syncer, &windows).await;
        let (committed, failure) = fold_round(results);

        if let Some(e) = failure {
            if let Some(end) = committed.and_then(|r| r.end_cursor) {
                warn!("Round failed, keeping progress up to block {}", end);
                self.ctx.advance(end);
            }
            return Err(e);
        }

        let result = committed.unwrap_or_default();
        let synced = result.end_cursor.unwrap_or(self.ctx.cursor).saturating_sub(self.ctx.cursor);
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { synced as f64 / elapsed } else { 0.0 };
        info!(
            "Round complete: {} blocks up to {:?} in {} ({})",
            synced,
            result.end_cursor,
            format_duration(elapsed),
            format_rate(rate)
        );
        if !result.has_blocks {
            info!(cursor = self.ctx.cursor, "All blocks synced");
        }
        debug!(?result, "Round result");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_fills_gaps_from_settings() {
        let job = SyncJob::from_json(r#"{"cursor": 100, "watch": false}"#).unwrap();
        let ctx = job.into_context(&SyncSettings::default());

        assert_eq!(ctx.cursor, 100);
        assert_eq!(ctx.offset, 10);
        assert_eq!(ctx.limit, 100);
        assert!(!ctx.watch);
    }

    #[test]
    fn empty_payload_starts_from_zero() {
        let ctx = SyncJob::from_json("{}").unwrap().into_context(&SyncSettings::default());
        assert_eq!(ctx.cursor, 0);
        assert!(ctx.watch);
    }

    #[test]
    fn malformed_payload_is_a_serialization_error() {
        let err = SyncJob::from_json(r#"{"cursor": "soon"}"#).unwrap_err();
        assert!(matches!(err, SyncError::Serialization(_)));
    }
}
