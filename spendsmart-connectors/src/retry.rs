//! Retry-with-backoff for the flaky upstreams

use std::future::Future;
use std::time::Duration;

use spendsmart_core::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op` up to `policy.attempts` times, doubling the delay between
/// attempts. Only `UpstreamUnavailable` is retried; every other error is
/// surfaced immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.attempts => {
                eprintln!(
                    "{what}: attempt {attempt}/{} failed ({e}); retrying in {}s",
                    policy.attempts,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
