use serde::{Deserialize, Serialize};

use crate::models::Block;

/// Latest block as reported by the node. Replaced on every refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub height: u64,
    pub hash: String,
    pub timestamp: u64,
}

impl ChainHead {
    pub fn new(height: u64, hash: impl Into<String>, timestamp: u64) -> Self {
        Self {
            height,
            hash: hash.into(),
            timestamp,
        }
    }
}

impl From<&Block> for ChainHead {
    fn from(block: &Block) -> Self {
        Self::new(block.number, block.hash.clone(), block.timestamp)
    }
}

/// One unit of fetch+persist work: the blocks at heights `(from, to]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncWindow {
    pub from: u64,
    pub to: u64,
}

impl SyncWindow {
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "window bounds out of order: {} > {}", from, to);
        Self { from, to }
    }

    /// Number of blocks requested for this window
    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.to == self.from
    }
}

/// Outcome of syncing one window, or of a whole round when taken from its last window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchRoundResult {
    /// Height of the last block the node returned, if any.
    pub end_cursor: Option<u64>,
    pub has_blocks: bool,
}

impl BatchRoundResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A page of blocks returned by the node, in ascending height order.
#[derive(Clone, Debug, Default)]
pub struct BlockPage {
    pub blocks: Vec<Block>,
    pub end_cursor: Option<u64>,
}

impl BlockPage {
    pub fn new(blocks: Vec<Block>) -> Self {
        let end_cursor = blocks.last().map(|b| b.number);
        Self { blocks, end_cursor }
    }
}
