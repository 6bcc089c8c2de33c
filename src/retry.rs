use std::future::Future;

use crate::config::RetryPolicy;
use crate::error::AppError;

/// Runs `handler` up to `policy.max_attempts` times with the policy's
/// exponential backoff, retrying only `AppError::is_retryable()` errors.
///
/// A poison, waitlisted, best-effort, or refresh error is returned
/// immediately on the first attempt — those are not transient by
/// definition (§7).
pub async fn execute_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    mut handler: F,
) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 1;
    loop {
        match handler(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                tracing::warn!(attempt, max_attempts = policy.max_attempts, error = %e, "retrying after transient error");
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), AppError> = execute_with_retry(&policy, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Transient(anyhow::anyhow!("boom"))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_without_further_retries_once_handler_returns_ok() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);

        let result = execute_with_retry(&policy, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AppError::Transient(anyhow::anyhow!("boom")))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn poison_error_is_not_retried() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(5),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), AppError> = execute_with_retry(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Poison("bad input".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
