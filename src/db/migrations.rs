use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info};

/// Schema bootstrap, applied in order. Every statement is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "blocks table",
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            number BIGINT PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            parent_hash TEXT NOT NULL,
            timestamp BIGINT NOT NULL,
            transactions_root TEXT NOT NULL,
            state_root TEXT NOT NULL,
            receipts_root TEXT NOT NULL,
            gas_used BIGINT NOT NULL,
            gas_limit BIGINT NOT NULL,
            base_fee_per_gas BIGINT,
            extra_data TEXT NOT NULL,
            miner TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            total_difficulty TEXT,
            size BIGINT NOT NULL,
            transaction_count BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "transactions table",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_number BIGINT NOT NULL REFERENCES blocks (number) ON DELETE CASCADE,
            block_hash TEXT NOT NULL,
            transaction_index BIGINT NOT NULL,
            from_address TEXT,
            to_address TEXT,
            value TEXT NOT NULL,
            gas BIGINT NOT NULL,
            gas_price BIGINT,
            input TEXT NOT NULL,
            nonce BIGINT NOT NULL
        )
        "#,
    ),
    (
        "sync_jobs table",
        r#"
        CREATE TABLE IF NOT EXISTS sync_jobs (
            id BIGSERIAL PRIMARY KEY,
            topic TEXT NOT NULL,
            payload JSONB NOT NULL,
            first_block BIGINT,
            last_block BIGINT,
            created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "block timestamp index",
        "CREATE INDEX IF NOT EXISTS idx_blocks_timestamp ON blocks (timestamp)",
    ),
    (
        "transaction block index",
        "CREATE INDEX IF NOT EXISTS idx_transactions_block_number ON transactions (block_number)",
    ),
    (
        "sync_jobs topic index",
        "CREATE INDEX IF NOT EXISTS idx_sync_jobs_topic ON sync_jobs (topic, id)",
    ),
    (
        "job notification function",
        r#"
        CREATE OR REPLACE FUNCTION notify_sync_job()
        RETURNS TRIGGER AS $$
        BEGIN
            PERFORM pg_notify('sync_jobs', json_build_object(
                'id', NEW.id,
                'topic', NEW.topic,
                'first_block', NEW.first_block,
                'last_block', NEW.last_block
            )::text);
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    ),
    (
        "drop job trigger",
        "DROP TRIGGER IF EXISTS sync_job_insert_trigger ON sync_jobs",
    ),
    (
        "job trigger",
        r#"
        CREATE TRIGGER sync_job_insert_trigger
        AFTER INSERT ON sync_jobs
        FOR EACH ROW
        EXECUTE FUNCTION notify_sync_job()
        "#,
    ),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations");

    // Statements run one by one so a failure names the step
    for (name, statement) in MIGRATIONS {
        info!("Applying migration: {}", name);
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Failed to apply migration '{}': {}", name, e);
                e
            })
            .with_context(|| format!("migration '{}' failed", name))?;
    }

    info!("Database migrations completed successfully");
    Ok(())
}
