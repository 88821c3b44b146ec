use thiserror::Error;

use crate::sync::state::{SyncEvent, SyncState};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid transition: {event:?} in state {state:?}")]
    InvalidTransition { state: SyncState, event: SyncEvent },

    /// Top-level failure reported by the sync machine, carrying the cursor it stopped at.
    #[error("Block synchronization failed at cursor {cursor}: {source}")]
    Sync {
        cursor: u64,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Wrap an error raised while driving the machine.
    pub fn wrap(cursor: u64, source: SyncError) -> Self {
        Self::Sync {
            cursor,
            source: Box::new(source),
        }
    }

    /// Innermost error, skipping `Sync` wrappers.
    pub fn root_cause(&self) -> &SyncError {
        match self {
            Self::Sync { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
