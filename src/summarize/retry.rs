//! Retry policy as data, plus the typed errors the engine seam returns.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Network trouble, timeouts, 5xx, 408/429. Worth retrying.
    #[error("engine request failed: {0}")]
    Transient(String),
    /// A reply arrived but could not be used. Worth another attempt.
    #[error("engine returned unusable output: {0}")]
    BadResponse(String),
    /// Bad credentials or request shape. Retrying cannot help.
    #[error("engine rejected the request: {0}")]
    Misconfigured(String),
    /// No engine configured for this process.
    #[error("engine disabled")]
    Disabled,
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_) | EngineError::BadResponse(_))
    }
}

/// Bounded attempts with a delay that doubles after every failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay after the given 1-based attempt: base << (attempt - 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay * (1u32 << shift)
    }
}

/// Run `op` under the policy. The operation always runs at least once;
/// non-retryable errors and exhausted attempts surface the last error
/// unchanged.
pub async fn invoke_with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                counter!("digest_engine_retries_total").increment(1);
                warn!(error = %e, attempt, "engine call failed, backing off");
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn retryability_matches_error_class() {
        assert!(EngineError::Transient("x".into()).is_retryable());
        assert!(EngineError::BadResponse("x".into()).is_retryable());
        assert!(!EngineError::Misconfigured("x".into()).is_retryable());
        assert!(!EngineError::Disabled.is_retryable());
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let result = invoke_with_retry(fast_policy(), move || {
            let calls = Arc::clone(&seen);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(EngineError::Transient("flaky".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let result: Result<(), _> = invoke_with_retry(fast_policy(), move || {
            let calls = Arc::clone(&seen);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::BadResponse("garbage".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(EngineError::BadResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let result: Result<(), _> = invoke_with_retry(fast_policy(), move || {
            let calls = Arc::clone(&seen);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::Misconfigured("bad key".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(EngineError::Misconfigured(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
