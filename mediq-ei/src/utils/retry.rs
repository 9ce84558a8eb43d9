//! Provider Call Retry Logic
//!
//! Every external provider call goes through [`with_retry`]: each attempt is
//! bounded by a timeout, retryable failures back off exponentially, and after
//! the last attempt the call reports [`ProviderError::Unavailable`]. Callers
//! then [`degrade`] that into "no result" instead of aborting the pipeline.

use crate::config::RetryPolicy;
use crate::error::ProviderError;
use std::future::Future;
use std::time::Instant;

/// Retry a provider call with timeout and exponential backoff.
///
/// **Algorithm:**
/// 1. Attempt operation under `policy.timeout()`
/// 2. If successful, return result
/// 3. If the error is retryable and attempts remain: log WARN, back off, retry
/// 4. If the error is not retryable: return it immediately
/// 5. After the last attempt: return `ProviderError::Unavailable`
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying provider call");
        }

        let outcome = match tokio::time::timeout(policy.timeout(), operation()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: operation_name.to_string(),
                timeout_ms: policy.timeout_ms,
            }),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Provider call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Provider call failed: attempts exhausted"
                    );
                    return Err(ProviderError::Unavailable {
                        provider: err.provider().to_string(),
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }

                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %err,
                    "Provider call failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Turn a failed provider call into "no result", logging why
pub fn degrade<T>(operation_name: &str, result: Result<T, ProviderError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                operation = operation_name,
                error = %err,
                "Provider unavailable, continuing without result"
            );
            None
        }
    }
}
