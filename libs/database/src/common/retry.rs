//! Exponential backoff for opening connections at process start

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

/// How often and how patiently to retry a failing connect
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Each delay is scaled into [50%, 100%] of its nominal value
    pub jitter: bool,
}

impl Default for RetryConfig {
    /// 5 retries starting at 200ms, doubling up to 5s, with jitter.
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Nominal wait before retry number `retry` (0-based), before jitter
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.min(16));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn wait_before(&self, retry: u32) -> Duration {
        let nominal = self.backoff(retry);
        if self.jitter { jittered(nominal) } else { nominal }
    }
}

/// Pseudo-random scaling into [0.5, 1.0) without pulling in an RNG
fn jittered(delay: Duration) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let percent = 50 + RandomState::new().hash_one(std::time::SystemTime::now()) % 50;
    delay.mul_f64(percent as f64 / 100.0)
}

/// Call `operation` until it succeeds or the retries are spent
///
/// `target` names what is being connected to in the logs.
pub async fn retry_with_backoff<F, Fut, T, E>(target: &str, mut operation: F, config: RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if retries > 0 {
                    info!(target_name = target, retries, "Connected after retrying");
                }
                return Ok(value);
            }
            Err(err) if retries >= config.max_retries => {
                warn!(target_name = target, attempts = retries + 1, error = %err, "Giving up");
                return Err(err);
            }
            Err(err) => {
                let wait = config.wait_before(retries);
                warn!(
                    target_name = target,
                    attempt = retries + 1,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Connect failed, retrying"
                );
                tokio::time::sleep(wait).await;
                retries += 1;
            }
        }
    }
}

/// [`retry_with_backoff`] with [`RetryConfig::default`]
pub async fn retry<F, Fut, T, E>(target: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff(target, operation, RetryConfig::default()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<&'static str, String>> {
        move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if attempt < failures {
                Err(format!("connection refused #{}", attempt + 1))
            } else {
                Ok("connected")
            })
        }
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry("gateway", flaky(0, calls.clone())).await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new().without_jitter();

        let started = tokio::time::Instant::now();
        let result = retry_with_backoff("redis", flaky(2, calls.clone()), config).await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig::new().with_max_retries(2).without_jitter();

        let result = retry_with_backoff("gateway", flaky(u32::MAX, calls.clone()), config).await;

        assert_eq!(result.unwrap_err(), "connection refused #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(300));
        assert_eq!(config.backoff(40), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_half_and_full() {
        for _ in 0..20 {
            let wait = jittered(Duration::from_millis(1000));
            assert!(wait >= Duration::from_millis(500) && wait < Duration::from_millis(1000));
        }
    }
}
