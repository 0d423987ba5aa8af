//! Exponential backoff retry driven by the error classifier.

use crate::classify::classify;
use crate::config::RetryConfig;
use std::future::Future;

/// Execute an async operation, retrying transient failures with exponential backoff.
///
/// Each failure is classified; kinds outside `config.retriable` are returned
/// immediately without consuming the retry budget. Retriable failures wait
/// `base_delay * 2^(attempt - 1)` before the next call, up to `max_attempts`
/// calls in total, after which the last failure is returned.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = classify(&err);
                if !config.is_retriable(kind) {
                    tracing::debug!(kind = %kind, error = %err, "Failure is not retriable");
                    return Err(err);
                }
                if attempt >= max_attempts {
                    tracing::warn!(
                        attempts = attempt,
                        kind = %kind,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt,
                    max = max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    kind = %kind,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
