/// Integration tests for resilience library
use resilience::{with_deadline, with_retry, RetryConfig, RetryError, Transient};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq)]
enum CallError {
    TimedOut,
    Rejected,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Transient for CallError {
    fn is_transient(&self) -> bool {
        matches!(self, CallError::TimedOut)
    }
}

fn quick_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        jitter: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_slow_attempt_times_out_then_succeeds_on_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = with_retry(&quick_retry(2), move || {
        let n = calls_clone.fetch_add(1, Ordering::SeqCst);
        with_deadline(
            Duration::from_millis(20),
            async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, CallError>("ok")
            },
            |_| CallError::TimedOut,
        )
    })
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_every_attempt_times_out() {
    let result = with_retry(&quick_retry(1), || {
        with_deadline(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, CallError>(())
            },
            |_| CallError::TimedOut,
        )
    })
    .await;

    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert_eq!(last, CallError::TimedOut);
        }
        _ => panic!("expected exhausted retries"),
    }
}

#[tokio::test]
async fn test_rejection_short_circuits() {
    let calls = Arc::new(AtomicU32::new(0));
    let calls_clone = calls.clone();

    let result = with_retry(&quick_retry(5), move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(CallError::Rejected) }
    })
    .await;

    assert_eq!(result.unwrap_err().into_inner(), CallError::Rejected);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
