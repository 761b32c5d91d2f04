//! Waiter - Poll a remote object until it reaches a target state
//!
//! Long-running operations (actions, provisioning, teardown) are observed by
//! repeatedly calling a refresh function that reports the object and its
//! current state string. The loop backs off exponentially and is cancelled by
//! the host's token.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::provider::{ErrorKind, ProviderError, ProviderResult};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_NOT_FOUND_CHECKS: usize = 20;

/// Waiter configuration
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    /// States that mean "keep polling"
    pub pending: Vec<String>,
    /// States that mean success. Empty means "wait until the object is gone".
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Initial delay before the first poll
    pub delay: Duration,
    /// Starting poll interval
    pub min_timeout: Duration,
    /// Consecutive not-found observations tolerated while waiting for a target
    pub not_found_checks: usize,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: MIN_POLL_INTERVAL,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_not_found_checks(mut self, checks: usize) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Poll `refresh` until the object reaches a target state.
    ///
    /// `refresh` yields `Some((object, state))`, or `None` when the object
    /// does not exist (a `NotFound` error is treated the same way). Returns
    /// the object in its target state, or `None` when the target is empty and
    /// the object disappeared.
    pub async fn wait_for_state<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut refresh: F,
    ) -> ProviderResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Option<(T, String)>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut last_state = String::from("(none)");
        let mut not_found = 0usize;
        let mut interval = self.min_timeout.max(MIN_POLL_INTERVAL);

        if !self.delay.is_zero() {
            self.sleep_until(cancel, (Instant::now() + self.delay).min(deadline))
                .await?;
        }

        loop {
            let observed = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::cancelled()),
                r = tokio::time::timeout_at(deadline, refresh()) => match r {
                    Ok(r) => r,
                    Err(_) => return Err(self.timeout_error(&last_state)),
                },
            };

            let observed = match observed {
                Ok(o) => o,
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };

            match observed {
                Some((object, state)) => {
                    not_found = 0;
                    log::debug!("[waiter] observed state '{state}'");
                    if self.target.iter().any(|t| *t == state) {
                        return Ok(Some(object));
                    }
                    if !self.pending.iter().any(|p| *p == state) {
                        return Err(ProviderError::new(
                            ErrorKind::UnexpectedState,
                            format!(
                                "unexpected state '{}', wanted target '{}'",
                                state,
                                self.target.join(", ")
                            ),
                        ));
                    }
                    last_state = state;
                }
                None => {
                    if self.target.is_empty() {
                        return Ok(None);
                    }
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(ProviderError::not_found(format!(
                            "couldn't find resource ({} retries)",
                            self.not_found_checks
                        )));
                    }
                    log::debug!("[waiter] resource not found ({not_found}/{})", self.not_found_checks);
                }
            }

            if Instant::now() >= deadline {
                return Err(self.timeout_error(&last_state));
            }
            self.sleep_until(cancel, (Instant::now() + interval).min(deadline))
                .await?;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }

    async fn sleep_until(&self, cancel: &CancellationToken, at: Instant) -> ProviderResult<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ProviderError::cancelled()),
            _ = tokio::time::sleep_until(at) => Ok(()),
        }
    }

    fn timeout_error(&self, last_state: &str) -> ProviderError {
        let target = if self.target.is_empty() {
            "(gone)".to_string()
        } else {
            self.target.join(", ")
        };
        ProviderError::new(
            ErrorKind::Timeout,
            format!(
                "timeout while waiting for state to become '{}' (last state: '{}', timeout: {:?})",
                target, last_state, self.timeout
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sequence(states: Vec<Option<&'static str>>) -> (Arc<AtomicUsize>, Arc<Vec<Option<&'static str>>>) {
        (Arc::new(AtomicUsize::new(0)), Arc::new(states))
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_state() {
        let (calls, states) = sequence(vec![Some("new"), Some("in-progress"), Some("completed")]);
        let conf = StateChangeConf::new(&["new", "in-progress"], &["completed"], Duration::from_secs(60));

        let result = conf
            .wait_for_state(&CancellationToken::new(), || {
                let i = calls.fetch_add(1, Ordering::SeqCst);
                let state = states[i.min(states.len() - 1)];
                async move { Ok(state.map(|s| (i, s.to_string()))) }
            })
            .await
            .unwrap();

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_fails() {
        let conf = StateChangeConf::new(&["new", "in-progress"], &["completed"], Duration::from_secs(60));
        let err = conf
            .wait_for_state(&CancellationToken::new(), || async {
                Ok(Some(((), "errored".to_string())))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedState);
        assert!(err.message.contains("errored"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_succeeds_when_gone() {
        let (calls, states) = sequence(vec![Some("DELETING"), None]);
        let conf = StateChangeConf::new(&["DELETING"], &[], Duration::from_secs(120));

        let result: Option<()> = conf
            .wait_for_state(&CancellationToken::new(), || {
                let i = calls.fetch_add(1, Ordering::SeqCst);
                let state = states[i.min(states.len() - 1)];
                async move { Ok(state.map(|s| ((), s.to_string()))) }
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_error_counts_as_missing() {
        let conf = StateChangeConf::new(&["DELETING"], &[], Duration::from_secs(120));
        let result: Option<()> = conf
            .wait_for_state(&CancellationToken::new(), || async {
                Err(ProviderError::from_status(404, "not found"))
            })
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_budget_is_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let conf = StateChangeConf::new(&["pending"], &["active"], Duration::from_secs(3600))
            .with_not_found_checks(3);
        let counter = calls.clone();
        let err = conf
            .wait_for_state(&CancellationToken::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Option<((), String)>, ProviderError>(None) }
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_names_last_state() {
        let conf = StateChangeConf::new(&["CREATING"], &["CREATED"], Duration::from_secs(30));
        let err = conf
            .wait_for_state(&CancellationToken::new(), || async {
                Ok(Some(((), "CREATING".to_string())))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.message.contains("last state: 'CREATING'"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let cancel = CancellationToken::new();
        let conf = StateChangeConf::new(&["in-progress"], &["completed"], Duration::from_secs(3600));
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let err = conf
            .wait_for_state(&cancel, || async { Ok(Some(((), "in-progress".to_string()))) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
