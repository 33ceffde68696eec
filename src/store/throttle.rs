//! Outbound request pacing and rate-limit retries.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};

use super::StoreError;

/// Enforces a minimum spacing between outbound store requests.
///
/// One limiter is shared by every bin of a store connection. Callers are
/// released in the order they acquire the internal lock.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until `min_interval` has passed since the previous permitted call.
    pub async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "Rate limiting store request"
                );
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Bounded exponential backoff for rate-limited store calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Run `operation`, retrying only rate-limit failures with exponential delay.
///
/// Any other failure is returned immediately. After `max_attempts` calls the
/// last failure is returned.
pub async fn run_with_retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Store rate limit exceeded, backing off"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        let start = Instant::now();

        limiter.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.throttle().await;
        limiter.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(start.elapsed() < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_does_not_wait_after_idle_period() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        limiter.throttle().await;
        sleep(Duration::from_millis(1500)).await;

        let before = Instant::now();
        limiter.throttle().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let call_times = Arc::new(std::sync::Mutex::new(Vec::new()));
        let start = Instant::now();

        let result: Result<(), _> = run_with_retry(RetryPolicy::default(), || {
            let calls = calls.clone();
            let call_times = call_times.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                call_times.lock().unwrap().push(start.elapsed());
                Err(StoreError::RateLimited)
            }
        })
        .await;

        assert!(matches!(result, Err(StoreError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let times = call_times.lock().unwrap().clone();
        assert_eq!(times[1] - times[0], Duration::from_millis(2000));
        assert_eq!(times[2] - times[1], Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = run_with_retry(RetryPolicy::default(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::NotFound("bin".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_after_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = run_with_retry(RetryPolicy::default(), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(StoreError::RateLimited)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
