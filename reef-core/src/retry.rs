//! Retry - Re-run an operation while it fails with a retryable error

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Outcome of one attempt
#[derive(Debug)]
pub enum RetryError {
    Retryable(ProviderError),
    NonRetryable(ProviderError),
}

impl RetryError {
    /// Classify an error with a predicate
    pub fn classify(err: ProviderError, retryable: fn(&ProviderError) -> bool) -> Self {
        if retryable(&err) {
            RetryError::Retryable(err)
        } else {
            RetryError::NonRetryable(err)
        }
    }
}

/// Run `op` until it succeeds, fails non-retryably, or `timeout` elapses.
/// On timeout the last retryable error is returned.
pub async fn retry<T, F, Fut>(
    cancel: &CancellationToken,
    timeout: Duration,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1u32;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::cancelled()),
            r = op() => r,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(RetryError::NonRetryable(e)) => return Err(e),
            Err(RetryError::Retryable(e)) => e,
        };

        let now = Instant::now();
        if now >= deadline {
            log::warn!("Giving up after {attempt} attempts: {err}");
            return Err(err);
        }

        log::debug!("Attempt {attempt} failed, retrying in {backoff:?}: {err}");
        tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::cancelled()),
            _ = tokio::time::sleep_until((now + backoff).min(deadline)) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}

fn is_transient(err: &ProviderError) -> bool {
    match err.status {
        Some(status) => status >= 500,
        None => err.kind == ErrorKind::Transient,
    }
}

/// Create-time policy: 5xx and 412 are retried
pub fn is_retryable_on_create(err: &ProviderError) -> bool {
    is_transient(err) || err.status == Some(412)
}

/// Delete-time policy: additionally 403 and other conflict statuses
pub fn is_retryable_on_delete(err: &ProviderError) -> bool {
    is_retryable_on_create(err) || matches!(err.status, Some(403 | 409 | 422))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = retry(&CancellationToken::new(), Duration::from_secs(60), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RetryError::Retryable(ProviderError::from_status(503, "unavailable")))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let err = retry(&CancellationToken::new(), Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(RetryError::NonRetryable(ProviderError::from_status(400, "bad"))) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_last_error() {
        let err = retry(&CancellationToken::new(), Duration::from_secs(5), || async {
            Err::<(), _>(RetryError::Retryable(ProviderError::from_status(500, "boom")))
        })
        .await
        .unwrap_err();
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn create_and_delete_policies() {
        let e = |s| ProviderError::from_status(s, "x");
        assert!(is_retryable_on_create(&e(500)));
        assert!(is_retryable_on_create(&e(412)));
        assert!(!is_retryable_on_create(&e(403)));
        assert!(!is_retryable_on_create(&e(422)));
        assert!(is_retryable_on_delete(&e(403)));
        assert!(is_retryable_on_delete(&e(409)));
        assert!(is_retryable_on_delete(&e(422)));
        assert!(!is_retryable_on_delete(&e(400)));
        assert!(!is_retryable_on_delete(&e(404)));
    }
}
