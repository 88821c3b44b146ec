use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{BlockNumber, Transaction as EthTransaction, U256};
use tracing::{debug, info, instrument};

use crate::models::{Block, BlockPage, ChainHead, Transaction};
use crate::sync::SyncError;
use crate::utils::retry::with_retry;

/// Default number of `eth_getBlockByNumber` calls issued concurrently
const DEFAULT_RPC_BATCH_SIZE: usize = 10;

/// Read access to the chain node.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Latest block known to the node.
    async fn latest_head(&self) -> Result<ChainHead, SyncError>;

    /// Up to `count` blocks with heights `after + 1 ..= after + count`, ascending.
    ///
    /// The page is cut short at the first height the node does not have yet.
    /// Height 0 is never requested: a cursor of 0 means nothing below block 1
    /// is wanted, so genesis is not indexed.
    async fn fetch_blocks(&self, count: u64, after: u64) -> Result<BlockPage, SyncError>;
}

/// Node client over Ethereum JSON-RPC
pub struct EthNodeClient {
    provider: Provider<Http>,
    /// Blocks requested concurrently per RPC round trip
    rpc_batch_size: usize,
    /// Retry delay for failed requests (ms)
    retry_delay: u64,
    /// Maximum number of retries for failed requests
    max_retries: u32,
}

impl EthNodeClient {
    pub fn new(provider_url: &str) -> Result<Self, SyncError> {
        let provider = Provider::<Http>::try_from(provider_url)
            .map_err(|e| SyncError::Provider(format!("Failed to create HTTP provider: {}", e)))?;

        info!("Created HTTP provider for {}", provider_url);
        Ok(Self {
            provider,
            rpc_batch_size: DEFAULT_RPC_BATCH_SIZE,
            retry_delay: 1000,
            max_retries: 5,
        })
    }

    /// Configure retry settings
    pub fn with_retry_settings(mut self, retry_delay: u64, max_retries: u32) -> Self {
        info!("Setting retry settings: delay={}ms, max_retries={}", retry_delay, max_retries);
        self.retry_delay = retry_delay;
        self.max_retries = max_retries;
        self
    }

    /// Configure RPC batch size
    pub fn with_rpc_batch_size(mut self, rpc_batch_size: usize) -> Self {
        info!("Setting RPC batch size to {}", rpc_batch_size);
        self.rpc_batch_size = rpc_batch_size.max(1);
        self
    }

    /// Fetch full blocks for consecutive heights; `None` marks heights the node doesn't have.
    async fn fetch_blocks_batch(
        &self,
        block_numbers: Vec<u64>,
    ) -> Result<Vec<Option<ethers::types::Block<EthTransaction>>>, SyncError> {
        let provider = self.provider.clone();

        with_retry(
            move || {
                let provider = provider.clone();
                let block_numbers = block_numbers.clone();

                async move {
                    let batch = block_numbers
                        .into_iter()
                        .map(|n| provider.get_block_with_txs(BlockNumber::Number(n.into())))
                        .collect::<Vec<_>>();

                    futures::future::try_join_all(batch)
                        .await
                        .map_err(|e| SyncError::Provider(format!("Failed to execute batch request: {}", e)))
                }
            },
            self.retry_delay,
            self.max_retries,
            "fetch_blocks_batch",
        )
        .await
    }
}

#[async_trait]
impl NodeClient for EthNodeClient {
    async fn latest_head(&self) -> Result<ChainHead, SyncError> {
        debug!("Fetching latest block from the chain");

        let block = with_retry(
            || async {
                self.provider
                    .get_block(BlockNumber::Latest)
                    .await
                    .map_err(|e| SyncError::Provider(format!("Failed to get latest block: {}", e)))?
                    .ok_or_else(|| SyncError::Provider("Node returned no latest block".to_string()))
            },
            self.retry_delay,
            self.max_retries,
            "latest_head",
        )
        .await?;

        let height = block
            .number
            .ok_or_else(|| SyncError::Parse("Latest block number missing".to_string()))?
            .as_u64();

        debug!("Latest block number: {}", height);
        Ok(ChainHead::new(
            height,
            format!("{:?}", block.hash.unwrap_or_default()),
            checked_u64(block.timestamp, "timestamp", height)?,
        ))
    }

    #[instrument(skip(self))]
    async fn fetch_blocks(&self, count: u64, after: u64) -> Result<BlockPage, SyncError> {
        let mut blocks = Vec::with_capacity(count.min(self.rpc_batch_size as u64 * 16) as usize);
        let last = after.saturating_add(count);
        let mut current = after + 1;

        while current <= last {
            let batch_end = std::cmp::min(current + self.rpc_batch_size as u64 - 1, last);
            debug!("Fetching blocks {} to {}", current, batch_end);

            let fetched = self.fetch_blocks_batch((current..=batch_end).collect()).await?;
            let requested = fetched.len();
            let before = blocks.len();
            for eth_block in fetched.into_iter().map_while(|b| b) {
                blocks.push(convert_block(eth_block)?);
            }

            let returned = blocks.len() - before;
            if returned < requested {
                // Nothing past this height exists on the node yet
                debug!(
                    "Node returned {} of {} blocks from {}, stopping at its head",
                    returned, requested, current
                );
                break;
            }
            current = batch_end + 1;
        }

        Ok(BlockPage::new(blocks))
    }
}

/// Narrow a node-reported quantity to `u64`, rejecting values that don't fit
fn checked_u64(value: U256, field: &str, block_number: u64) -> Result<u64, SyncError> {
    if value > U256::from(u64::MAX) {
        return Err(SyncError::Parse(format!(
            "Block {}: {} {} does not fit in u64",
            block_number, field, value
        )));
    }
    Ok(value.as_u64())
}

/// Convert an ethers block with full transactions into our model
fn convert_block(eth_block: ethers::types::Block<EthTransaction>) -> Result<Block, SyncError> {
    let block_number = eth_block
        .number
        .ok_or_else(|| SyncError::Parse("Block number missing".to_string()))?
        .as_u64();
    let block_hash = format!("{:?}", eth_block.hash.unwrap_or_default());

    let transactions = eth_block
        .transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| {
            Ok(Transaction {
                hash: format!("{:?}", tx.hash),
                from: Some(format!("{:?}", tx.from)),
                to: tx.to.map(|addr| format!("{:?}", addr)),
                value: tx.value.to_string(),
                gas: checked_u64(tx.gas, "transaction gas", block_number)?,
                gas_price: tx
                    .gas_price
                    .map(|gp| checked_u64(gp, "transaction gas price", block_number))
                    .transpose()?,
                input: format!("0x{}", hex::encode(&tx.input)),
                nonce: checked_u64(tx.nonce, "transaction nonce", block_number)?,
                transaction_index: tx.transaction_index.map(|i| i.as_u64()).unwrap_or(i as u64),
                block_hash: block_hash.clone(),
                block_number,
            })
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    Ok(Block {
        number: block_number,
        hash: block_hash,
        parent_hash: format!("{:?}", eth_block.parent_hash),
        timestamp: checked_u64(eth_block.timestamp, "timestamp", block_number)?,
        transactions_root: format!("{:?}", eth_block.transactions_root),
        state_root: format!("{:?}", eth_block.state_root),
        receipts_root: format!("{:?}", eth_block.receipts_root),
        gas_used: checked_u64(eth_block.gas_used, "gas used", block_number)?,
        gas_limit: checked_u64(eth_block.gas_limit, "gas limit", block_number)?,
        base_fee_per_gas: eth_block
            .base_fee_per_gas
            .map(|fee| checked_u64(fee, "base fee", block_number))
            .transpose()?,
        extra_data: format!("0x{}", hex::encode(&eth_block.extra_data)),
        miner: format!("{:?}", eth_block.author.unwrap_or_default()),
        difficulty: eth_block.difficulty,
        total_difficulty: eth_block.total_difficulty,
        size: checked_u64(eth_block.size.unwrap_or_default(), "size", block_number)?,
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{H256, U64};

    fn eth_block(number: u64, transactions: Vec<EthTransaction>) -> ethers::types::Block<EthTransaction> {
        ethers::types::Block {
            number: Some(U64::from(number)),
            hash: Some(H256::repeat_byte(0xab)),
            timestamp: U256::from(1_700_000_000u64),
            gas_used: U256::from(21_000u64),
            gas_limit: U256::from(30_000_000u64),
            base_fee_per_gas: Some(U256::from(7u64)),
            size: Some(U256::from(1_024u64)),
            transactions,
            ..Default::default()
        }
    }

    fn eth_tx(index: u64) -> EthTransaction {
        EthTransaction {
            hash: H256::from_low_u64_be(index + 1),
            gas: U256::from(21_000u64),
            gas_price: Some(U256::from(1_000_000_000u64)),
            nonce: U256::from(index),
            transaction_index: Some(U64::from(index)),
            ..Default::default()
        }
    }

    #[test]
    fn converts_block_and_transactions() {
        let block = convert_block(eth_block(7, vec![eth_tx(0), eth_tx(1)])).unwrap();

        assert_eq!(block.number, 7);
        assert_eq!(block.timestamp, 1_700_000_000);
        assert_eq!(block.base_fee_per_gas, Some(7));
        assert_eq!(block.transaction_count(), 2);
        assert_eq!(block.transactions[1].nonce, 1);
        assert_eq!(block.transactions[1].block_number, 7);
        assert_eq!(block.transactions[1].block_hash, block.hash);
    }

    #[test]
    fn oversized_transaction_gas_is_a_parse_error() {
        let tx = EthTransaction {
            gas: U256::MAX,
            ..eth_tx(0)
        };

        let err = convert_block(eth_block(7, vec![tx])).unwrap_err();
        assert!(matches!(err, SyncError::Parse(ref msg) if msg.contains("transaction gas")));
    }

    #[test]
    fn oversized_block_fields_are_parse_errors() {
        let mut block = eth_block(7, vec![]);
        block.timestamp = U256::MAX;
        assert!(matches!(convert_block(block), Err(SyncError::Parse(_))));

        let mut block = eth_block(7, vec![]);
        block.base_fee_per_gas = Some(U256::from(u64::MAX) + 1);
        assert!(matches!(convert_block(block), Err(SyncError::Parse(_))));
    }

    #[test]
    fn boundary_value_still_fits() {
        assert_eq!(checked_u64(U256::from(u64::MAX), "gas", 1).unwrap(), u64::MAX);
    }

    #[test]
    fn missing_block_number_is_a_parse_error() {
        let mut block = eth_block(7, vec![]);
        block.number = None;
        assert!(matches!(convert_block(block), Err(SyncError::Parse(_))));
    }
}
