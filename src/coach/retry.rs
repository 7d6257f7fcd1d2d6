//! Exponential backoff for rate-limited batch calls
//!
//! Only HTTP 429 is retried. Every other error is returned immediately.

use std::future::Future;
use std::time::Duration;

use super::CoachError;

/// Retry schedule: `base_delay`, then doubling, for at most `max_retries`
/// retries after the first attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry)
    }
}

/// Run `op`, retrying on rate limiting.
///
/// Gives up with [`CoachError::QuotaExceeded`] once the retries are spent.
pub async fn call_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, CoachError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoachError>>,
{
    let mut retry = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                if retry >= policy.max_retries {
                    log::error!("Coach: still rate limited after {} retries", retry);
                    return Err(CoachError::QuotaExceeded);
                }
                let delay = policy.delay_for(retry);
                log::warn!(
                    "Coach: quota exceeded, retrying in {:?} ({} retries left)",
                    delay,
                    policy.max_retries - retry
                );
                tokio::time::sleep(delay).await;
                retry += 1;
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
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_default_schedule_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_success_after_rate_limits() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = call_with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CoachError::RateLimited("429".to_string()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_quota_exceeded_after_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), CoachError> = call_with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CoachError::ApiError {
                    status: 429,
                    message: "RESOURCE_EXHAUSTED".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(CoachError::QuotaExceeded)));
        // Initial attempt plus three retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), CoachError> = call_with_retry(&fast_policy(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CoachError::ApiError {
                    status: 400,
                    message: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(CoachError::ApiError { status: 400, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
