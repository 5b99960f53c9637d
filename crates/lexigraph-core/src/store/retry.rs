//! Bounded retry with randomized backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::RetryConfig;

/// Sleep before the next attempt: base delay scaled by the attempt number,
/// plus up to one base delay of jitter, capped at `max_delay_ms`.
pub(crate) async fn backoff_sleep(retry: &RetryConfig, attempt: usize) {
    let base = retry.base_delay_ms.saturating_mul(attempt as u64);
    let jitter = rand::thread_rng().gen_range(0..=retry.base_delay_ms);
    let wait = (base + jitter).min(retry.max_delay_ms);
    tokio::time::sleep(Duration::from_millis(wait)).await;
}

/// Run a fallible async operation with bounded, jittered retries.
///
/// Every failure is considered retryable; callers that can distinguish
/// permanent failures should bail out before calling this (see
/// [`super::graph::run_query`] for the graph-store variant).
pub async fn with_backoff<T, E, F, Fut>(retry: &RetryConfig, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retry.max_attempts => {
                warn!(attempt, error = %err, "operation failed, retrying");
                backoff_sleep(retry, attempt).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry(attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts: attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = with_backoff(&fast_retry(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, String> = with_backoff(&fast_retry(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
