use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Upper bound on a single backoff, in ms
const MAX_BACKOFF_MS: u64 = 60_000;

/// Run `operation` until it succeeds or `max_retries` retries are spent.
pub async fn with_retry<F, Fut, T, E>(
    operation: F,
    retry_delay: u64,
    max_retries: u32,
    operation_name: &str,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if attempt > max_retries => {
                error!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation_name, attempt, err
                );
                return Err(err);
            }
            Err(err) => {
                let backoff = exponential_backoff(retry_delay, attempt);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {}ms",
                    operation_name,
                    attempt,
                    max_retries + 1,
                    err,
                    backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }
}

/// Exponential backoff with ±20% jitter, capped at [`MAX_BACKOFF_MS`]
fn exponential_backoff(base_delay: u64, attempt: u32) -> u64 {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    let capped = base_delay.saturating_mul(factor).min(MAX_BACKOFF_MS);

    let jitter = (rand::random::<f64>() * 0.4 - 0.2) * capped as f64;
    (capped as f64 + jitter) as u64
}
