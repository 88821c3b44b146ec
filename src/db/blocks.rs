use anyhow::Result;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, error, instrument};

use crate::models::{Block, Transaction};
use crate::sync::SyncError;

/// Upsert a block and its transactions on the caller's connection.
///
/// Returns the block when the row came back from `RETURNING`, `None` otherwise.
#[instrument(skip(conn, block), fields(block_number = block.number, block_hash = %block.hash))]
pub async fn upsert_block(conn: &mut PgConnection, block: &Block) -> Result<Option<Block>, SyncError> {
    debug!("Saving block {} to database", block.number);

    // Convert U256 fields to strings for storage
    let difficulty = block.difficulty.to_string();
    let total_difficulty = block.total_difficulty.map(|td| td.to_string());

    // Upsert so a re-synced range overwrites instead of failing
    let query = r#"
    INSERT INTO blocks (
        number, hash, parent_hash, timestamp, transactions_root,
        state_root, receipts_root, gas_used, gas_limit, base_fee_per_gas,
        extra_data, miner, difficulty, total_difficulty, size, transaction_count
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    ON CONFLICT (number) DO UPDATE SET
        hash = EXCLUDED.hash,
        parent_hash = EXCLUDED.parent_hash,
        timestamp = EXCLUDED.timestamp,
        transactions_root = EXCLUDED.transactions_root,
        state_root = EXCLUDED.state_root,
        receipts_root = EXCLUDED.receipts_root,
        gas_used = EXCLUDED.gas_used,
        gas_limit = EXCLUDED.gas_limit,
        base_fee_per_gas = EXCLUDED.base_fee_per_gas,
        extra_data = EXCLUDED.extra_data,
        miner = EXCLUDED.miner,
        difficulty = EXCLUDED.difficulty,
        total_difficulty = EXCLUDED.total_difficulty,
        size = EXCLUDED.size,
        transaction_count = EXCLUDED.transaction_count,
        updated_at = CURRENT_TIMESTAMP
    RETURNING number
    "#;

    let row = sqlx::query(query)
        .bind(block.number as i64)
        .bind(&block.hash)
        .bind(&block.parent_hash)
        .bind(block.timestamp as i64)
        .bind(&block.transactions_root)
        .bind(&block.state_root)
        .bind(&block.receipts_root)
        .bind(block.gas_used as i64)
        .bind(block.gas_limit as i64)
        .bind(block.base_fee_per_gas.map(|fee| fee as i64))
        .bind(&block.extra_data)
        .bind(&block.miner)
        .bind(&difficulty)
        .bind(&total_difficulty)
        .bind(block.size as i64)
        .bind(block.transaction_count() as i64)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            error!("Failed to save block {}: {}", block.number, e);
            e
        })?;

    if row.is_none() {
        debug!("Block {} was not returned by the upsert", block.number);
        return Ok(None);
    }

    for transaction in &block.transactions {
        upsert_transaction(conn, transaction).await?;
    }

    debug!(
        "Block {} saved with {} transactions",
        block.number,
        block.transactions.len()
    );
    Ok(Some(block.clone()))
}

async fn upsert_transaction(conn: &mut PgConnection, tx: &Transaction) -> Result<(), SyncError> {
    let query = r#"
    INSERT INTO transactions (
        hash, block_number, block_hash, transaction_index, from_address,
        to_address, value, gas, gas_price, input, nonce
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (hash) DO UPDATE SET
        block_number = EXCLUDED.block_number,
        block_hash = EXCLUDED.block_hash,
        transaction_index = EXCLUDED.transaction_index,
        from_address = EXCLUDED.from_address,
        to_address = EXCLUDED.to_address,
        value = EXCLUDED.value,
        gas = EXCLUDED.gas,
        gas_price = EXCLUDED.gas_price,
        input = EXCLUDED.input,
        nonce = EXCLUDED.nonce
    "#;

    sqlx::query(query)
        .bind(&tx.hash)
        .bind(tx.block_number as i64)
        .bind(&tx.block_hash)
        .bind(tx.transaction_index as i64)
        .bind(&tx.from)
        .bind(&tx.to)
        .bind(&tx.value)
        .bind(tx.gas as i64)
        .bind(tx.gas_price.map(|gp| gp as i64))
        .bind(&tx.input)
        .bind(tx.nonce as i64)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            error!("Failed to save transaction {} of block {}: {}", tx.hash, tx.block_number, e);
            e
        })?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn get_latest_block_number(pool: &PgPool) -> Result<Option<u64>> {
    debug!("Fetching latest block number from database");

    let row = sqlx::query("SELECT MAX(number) as latest FROM blocks")
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            error!("Failed to get latest block number: {}", e);
            e
        })?;

    let latest = row
        .and_then(|row| row.try_get::<Option<i64>, _>("latest").ok())
        .flatten()
        .map(|n| n as u64);

    debug!("Latest block number from database: {:?}", latest);
    Ok(latest)
}
