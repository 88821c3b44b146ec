use tracing::info;

pub fn log_config(config: &crate::config::Config) {
    info!(
        "Config settings: start_block={}, batch_size={}, fetch_limit={}, rpc_batch_size={}",
        config.start_block, config.batch_size, config.fetch_limit, config.rpc_batch_size
    );

    if config.sequential {
        info!("Windows run sequentially");
    } else {
        info!("Windows run in parallel, up to {} at a time", config.max_concurrent_batches);
    }

    if config.watch {
        info!("Watch mode on, polling every {}ms once caught up", config.watch_interval_ms);
    }

    if let Some(blocks_from_tip) = config.blocks_from_tip {
        info!("Indexing {} blocks from chain tip", blocks_from_tip);
    }

    info!("Downstream jobs go to topic {}", config.queue_topic);
}
