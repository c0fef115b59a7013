use std::future::Future;
use std::time::Duration;
use transita_core::{CoreError, CoreResult};

/// Run an I/O operation, retrying transient failures with exponential
/// backoff. Bounded: after `attempts` tries the last error surfaces to the
/// caller as-is. Non-transient errors are never retried.
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut delay = base_delay;
    let mut tried = 0u32;
    loop {
        match op().await {
            Err(CoreError::Transient(reason)) if tried + 1 < attempts => {
                tried += 1;
                tracing::warn!(label, attempt = tried, %reason, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", 3, Duration::from_millis(50), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::Transient("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_the_attempt_budget() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_backoff("test", 3, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::Transient("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(CoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_backoff("test", 5, Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::NotFound("booking".into())) }
        })
        .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
