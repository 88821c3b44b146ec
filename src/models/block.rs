use ethers::types::U256;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: u64,
    pub transactions_root: String,
    pub state_root: String,
    pub receipts_root: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub extra_data: String,
    pub miner: String,
    pub difficulty: U256,
    pub total_difficulty: Option<U256>,
    pub size: u64,
    pub transactions: Vec<Transaction>,
}

impl Block {
    // Helper to create a dummy block for testing
    pub fn dummy(number: u64) -> Self {
        Self {
            number,
            hash: format!("0xhash{}", number),
            parent_hash: format!("0xhash{}", number.saturating_sub(1)),
            timestamp: 1678912345 + number,
            transactions_root: "0xtxroot".to_string(),
            state_root: "0xstateroot".to_string(),
            receipts_root: "0xreceiptsroot".to_string(),
            gas_used: 21000,
            gas_limit: 30000000,
            base_fee_per_gas: Some(1000000000),
            extra_data: "0x".to_string(),
            miner: "0xminer".to_string(),
            difficulty: U256::from(2),
            total_difficulty: Some(U256::from(100)),
            size: 1000,
            transactions: vec![Transaction::dummy(number, 0)],
        }
    }

    pub fn transaction_count(&self) -> u64 {
        self.transactions.len() as u64
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: String,
    pub gas: u64,
    pub gas_price: Option<u64>,
    pub input: String,
    pub nonce: u64,
    pub transaction_index: u64,
    pub block_hash: String,
    pub block_number: u64,
}

impl Transaction {
    pub fn dummy(block_number: u64, index: u64) -> Self {
        Self {
            hash: format!("0xtx{}_{}", block_number, index),
            from: Some("0xsender".to_string()),
            to: Some("0xreceiver".to_string()),
            value: "0".to_string(),
            gas: 21000,
            gas_price: Some(1000000000),
            input: "0x".to_string(),
            nonce: index,
            transaction_index: index,
            block_hash: format!("0xhash{}", block_number),
            block_number,
        }
    }
}

/// Downstream work item: one per persisted batch, consumed by the transaction-sync stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockBatchJob {
    pub blocks: Vec<Block>,
}

impl BlockBatchJob {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Heights covered by the job, lowest and highest.
    pub fn span(&self) -> Option<(u64, u64)> {
        let first = self.blocks.first()?.number;
        let last = self.blocks.last()?.number;
        Some((first, last))
    }
}
