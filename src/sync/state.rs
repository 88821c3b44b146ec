//! States, events and the pure transition table of the sync machine.

use std::fmt;

use crate::models::{BatchRoundResult, ChainHead};
use crate::sync::SyncError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    GettingLastBlock,
    SyncingBlocks,
    Checking,
    Waiting,
    SyncingMissingBlocks,
    ResettingLastBlock,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::GettingLastBlock => "gettingLastBlock",
            Self::SyncingBlocks => "syncingBlocks",
            Self::Checking => "checking",
            Self::Waiting => "waiting",
            Self::SyncingMissingBlocks => "syncingMissingBlocks",
            Self::ResettingLastBlock => "resettingLastBlock",
        };
        f.write_str(name)
    }
}

/// Outcome of a state's entry action, fed back into [`transition`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    Start,
    HeadFetched(ChainHead),
    RoundCompleted(BatchRoundResult),
    Decide,
    TimerElapsed,
    MissingSynced(BatchRoundResult),
    HeadReset(ChainHead),
}

/// Mutable state threaded through the protocol. Owned by one machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncContext {
    /// Height of the last persisted block
    pub cursor: u64,
    /// Blocks per window
    pub offset: u64,
    /// Blocks per round
    pub limit: u64,
    pub head: Option<ChainHead>,
    pub last_result: Option<BatchRoundResult>,
    pub watch: bool,
}

impl SyncContext {
    pub fn new(cursor: u64, offset: u64, limit: u64, watch: bool) -> Self {
        Self {
            cursor,
            offset,
            limit,
            head: None,
            last_result: None,
            watch,
        }
    }

    /// Record a round result. A result without an end cursor keeps the current cursor.
    pub fn record(&mut self, result: BatchRoundResult) {
        if let Some(end) = result.end_cursor {
            self.advance(end);
        }
        self.last_result = Some(result);
    }

    /// Move the cursor forward; never moves it back.
    pub fn advance(&mut self, end_cursor: u64) {
        self.cursor = self.cursor.max(end_cursor);
    }

    pub fn has_blocks(&self) -> bool {
        self.last_result.map(|r| r.has_blocks).unwrap_or(false)
    }
}

/// Apply `event` in `state`, updating `ctx`. Pairs outside the table are rejected.
pub fn transition(
    state: SyncState,
    event: SyncEvent,
    ctx: &mut SyncContext,
) -> Result<SyncState, SyncError> {
    use SyncEvent as E;
    use SyncState as S;

    let next = match (state, event) {
        (S::Idle, E::Start) => S::GettingLastBlock,
        (S::GettingLastBlock, E::HeadFetched(head)) => {
            ctx.head = Some(head);
            S::SyncingBlocks
        }
        (S::SyncingBlocks, E::RoundCompleted(result)) => {
            ctx.record(result);
            S::Checking
        }
        (S::Checking, E::Decide) => match (ctx.has_blocks(), ctx.watch) {
            (true, _) => S::SyncingBlocks,
            (false, true) => S::Waiting,
            (false, false) => S::Idle,
        },
        (S::Waiting, E::TimerElapsed) => S::SyncingMissingBlocks,
        (S::SyncingMissingBlocks, E::MissingSynced(result)) => {
            ctx.record(result);
            S::ResettingLastBlock
        }
        (S::ResettingLastBlock, E::HeadReset(head)) => {
            ctx.head = Some(head);
            S::Waiting
        }
        (state, event) => return Err(SyncError::InvalidTransition { state, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(watch: bool) -> SyncContext {
        SyncContext::new(0, 10, 25, watch)
    }

    fn round(end_cursor: Option<u64>, has_blocks: bool) -> BatchRoundResult {
        BatchRoundResult {
            end_cursor,
            has_blocks,
        }
    }

    #[test]
    fn start_leaves_idle() {
        let mut ctx = ctx(false);
        let next = transition(SyncState::Idle, SyncEvent::Start, &mut ctx).unwrap();
        assert_eq!(next, SyncState::GettingLastBlock);
    }

    #[test]
    fn head_is_recorded() {
        let mut ctx = ctx(false);
        let head = ChainHead::new(22, "0xhead", 0);
        let next = transition(
            SyncState::GettingLastBlock,
            SyncEvent::HeadFetched(head.clone()),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(next, SyncState::SyncingBlocks);
        assert_eq!(ctx.head, Some(head));
    }

    #[test]
    fn round_advances_cursor() {
        let mut ctx = ctx(false);
        let next = transition(
            SyncState::SyncingBlocks,
            SyncEvent::RoundCompleted(round(Some(22), true)),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(next, SyncState::Checking);
        assert_eq!(ctx.cursor, 22);
    }

    #[test]
    fn round_without_end_cursor_keeps_cursor() {
        let mut ctx = SyncContext::new(40, 10, 25, false);
        transition(
            SyncState::SyncingBlocks,
            SyncEvent::RoundCompleted(round(None, false)),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(ctx.cursor, 40);
        assert_eq!(ctx.last_result, Some(round(None, false)));
    }

    #[test]
    fn cursor_never_moves_back() {
        let mut ctx = SyncContext::new(40, 10, 25, false);
        ctx.record(round(Some(30), true));
        assert_eq!(ctx.cursor, 40);
    }

    #[test]
    fn checking_guards() {
        let mut with_blocks = ctx(true);
        with_blocks.last_result = Some(round(Some(10), true));
        assert_eq!(
            transition(SyncState::Checking, SyncEvent::Decide, &mut with_blocks).unwrap(),
            SyncState::SyncingBlocks
        );

        let mut watching = ctx(true);
        watching.last_result = Some(round(None, false));
        assert_eq!(
            transition(SyncState::Checking, SyncEvent::Decide, &mut watching).unwrap(),
            SyncState::Waiting
        );

        let mut done = ctx(false);
        done.last_result = Some(round(None, false));
        assert_eq!(
            transition(SyncState::Checking, SyncEvent::Decide, &mut done).unwrap(),
            SyncState::Idle
        );
    }

    #[test]
    fn watch_cycle() {
        let mut ctx = ctx(true);
        let head = ChainHead::new(30, "0xhead", 0);

        let s = transition(SyncState::Waiting, SyncEvent::TimerElapsed, &mut ctx).unwrap();
        assert_eq!(s, SyncState::SyncingMissingBlocks);
        let s = transition(s, SyncEvent::MissingSynced(round(Some(30), true)), &mut ctx).unwrap();
        assert_eq!(s, SyncState::ResettingLastBlock);
        assert_eq!(ctx.cursor, 30);
        let s = transition(s, SyncEvent::HeadReset(head.clone()), &mut ctx).unwrap();
        assert_eq!(s, SyncState::Waiting);
        assert_eq!(ctx.head, Some(head));
    }

    #[test]
    fn unexpected_event_is_rejected() {
        let mut ctx = ctx(false);
        let err = transition(SyncState::Waiting, SyncEvent::Start, &mut ctx).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                state: SyncState::Waiting,
                event: SyncEvent::Start
            }
        ));
    }
}
