/// Deadline wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// Execute a future, giving up once `duration` has elapsed
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError(duration))
}

/// Execute a fallible future with a deadline, folding the elapsed case into `E`
pub async fn with_deadline<F, T, E>(
    duration: Duration,
    future: F,
    on_elapsed: impl FnOnce(TimeoutError) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed(TimeoutError(duration))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_deadline_passes_inner_error_through() {
        let result: Result<i32, String> = with_deadline(
            Duration::from_secs(1),
            async { Err("boom".to_string()) },
            |e| e.to_string(),
        )
        .await;
        assert_eq!(result, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_deadline_maps_elapsed() {
        let result: Result<i32, String> = with_deadline(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(1)
            },
            |_| "late".to_string(),
        )
        .await;
        assert_eq!(result, Err("late".to_string()));
    }
}
