use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use block_sync::config::Config;
use block_sync::sync::{
    EthNodeClient, NodeClient, ParallelExecutor, RangeSyncer, RoundExecutor, SequentialExecutor, SyncJob,
    SyncMachine,
};
use block_sync::utils;
use block_sync::{Database, PgJobQueue};

#[tokio::main]
async fn main() -> Result<()> {
    utils::logger::init_logger();
    info!("Starting block sync");

    let config = Config::load().context("Failed to load configuration")?;
    utils::config_logger::log_config(&config);

    let db = Database::new(&config.database_url)
        .await
        .context("Failed to connect to database")?
        .migrate()
        .await?;
    info!("Database connection established and migrations applied");

    let node = EthNodeClient::new(&config.http_provider_url)?
        .with_rpc_batch_size(config.rpc_batch_size)
        .with_retry_settings(config.retry_delay, config.max_retries);

    // Resume from the furthest of chain-tip offset, START_BLOCK and stored progress
    let chain_tip = node.latest_head().await.context("Failed to get chain tip")?.height;
    let latest_stored = db.get_latest_block_number().await?;
    let cursor = config.resume_cursor(chain_tip, latest_stored);
    info!(chain_tip, ?latest_stored, cursor, "Resolved start cursor");

    let syncer = RangeSyncer::new(Arc::new(node), Arc::new(db), Arc::new(PgJobQueue::new()))
        .with_topic(config.queue_topic.clone());

    let executor: Box<dyn RoundExecutor> = if config.sequential {
        Box::new(SequentialExecutor)
    } else {
        Box::new(ParallelExecutor::new(config.max_concurrent_batches))
    };

    let mut machine = SyncMachine::new(syncer, SyncJob::from_cursor(cursor), &config.sync_settings())
        .with_executor(executor);

    tokio::select! {
        result = machine.run() => {
            if let Err(e) = result {
                error!("Block sync stopped: {}", e.root_cause());
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, stopping block sync");
        }
    }

    Ok(())
}
