use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::sync::{SyncSettings, DEFAULT_QUEUE_TOPIC};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_provider_url: String,
    /// Initial cursor. Syncing starts at `start_block + 1`, so genesis is never indexed.
    pub start_block: u64,
    pub blocks_from_tip: Option<u64>,
    /// Blocks per window
    pub batch_size: u64,
    /// Blocks per round
    pub fetch_limit: u64,
    pub watch: bool,
    /// Run windows one at a time, for nodes that rate-limit
    pub sequential: bool,
    pub max_concurrent_batches: usize,
    pub watch_interval_ms: u64,
    pub rpc_batch_size: usize,
    pub retry_delay: u64,
    pub max_retries: u32,
    pub queue_topic: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenv::dotenv();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let http_provider_url = env::var("HTTP_PROVIDER_URL").context("HTTP_PROVIDER_URL must be set")?;

        let blocks_from_tip = match env::var("BLOCKS_FROM_TIP") {
            Ok(value) => Some(
                value
                    .parse()
                    .context("BLOCKS_FROM_TIP must be a valid number")?,
            ),
            Err(_) => None,
        };

        Ok(Config {
            database_url,
            http_provider_url,
            start_block: var_or("START_BLOCK", 0)?,
            blocks_from_tip,
            batch_size: var_or("BATCH_SIZE", 10)?,
            fetch_limit: var_or("FETCH_LIMIT", 100)?,
            watch: bool_var_or("WATCH", true)?,
            sequential: bool_var_or("SEQUENTIAL", false)?,
            max_concurrent_batches: var_or("MAX_CONCURRENT_BATCHES", 10)?,
            watch_interval_ms: var_or("WATCH_INTERVAL_MS", 1000)?,
            rpc_batch_size: var_or("RPC_BATCH_SIZE", 10)?,
            retry_delay: var_or("RETRY_DELAY", 1000)?, // ms
            max_retries: var_or("MAX_RETRIES", 5)?,
            queue_topic: env::var("QUEUE_TOPIC").unwrap_or_else(|_| DEFAULT_QUEUE_TOPIC.to_string()),
        })
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            offset: self.batch_size,
            limit: self.fetch_limit,
            watch: self.watch,
            watch_interval: Duration::from_millis(self.watch_interval_ms),
        }
    }

    /// Height to resume from, given the chain tip and what is already stored.
    pub fn resume_cursor(&self, chain_tip: u64, latest_stored: Option<u64>) -> u64 {
        let from_tip = self
            .blocks_from_tip
            .map(|depth| chain_tip.saturating_sub(depth))
            .unwrap_or(0);

        from_tip
            .max(self.start_block)
            .max(latest_stored.unwrap_or(0))
    }
}

fn var_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

fn bool_var_or(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(value) => parse_bool(&value).with_context(|| format!("{} must be a boolean", name)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("unrecognized boolean {:?}", other),
    }
}
