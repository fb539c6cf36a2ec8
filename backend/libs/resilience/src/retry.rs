/// Bounded retry with exponential backoff and jitter
///
/// Only errors that report themselves as transient are retried; anything else
/// is returned to the caller on the first attempt.
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Classifies an error as worth another attempt (lock wait, dropped
/// connection, timeout) or final (validation, auth, not found).
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error; carries the last one
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    /// The operation failed with an error that must not be retried
    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent(e) => e,
        }
    }
}

/// Execute `f` until it succeeds, fails permanently, or the retry budget runs out
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(RetryError::Permanent(e)),
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    warn!(attempts = attempt, error = %e, "Retry budget exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = calculate_backoff(backoff, config.jitter);
                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );

                tokio::time::sleep(delay).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * config.backoff_multiplier)
                        .min(config.max_backoff.as_millis() as f64)) as u64,
                );
            }
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_retry_success_on_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TestError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(TestError::Flaky)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(TestError::Fatal) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(TestError::Fatal))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_carries_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            ..fast()
        };
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(TestError::Flaky) }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, TestError::Flaky));
            }
            other => panic!("unexpected result: {:?}", other.map_err(|e| e.to_string())),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let _ = with_retry(&config, || async { Err::<i32, _>(TestError::Flaky) }).await;

        // 10ms + 20ms + 40ms
        assert!(start.elapsed() >= Duration::from_millis(70));
    }
}
