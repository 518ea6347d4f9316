//! Bounded retry for optimistic-concurrency attempts.
//!
//! An attempt is a function from the in-flight state to an [`AttemptOutcome`].
//! The policy only decides whether another attempt is allowed; it never sleeps,
//! since a lost version race is resolved by re-reading, not by waiting.

use std::future::Future;
use tokio::time::Instant;

use crate::error::LedgerError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Result of one attempt. `Retry` carries the refreshed state for the next one.
#[derive(Debug)]
pub enum AttemptOutcome<T, S> {
    Done(T),
    Retry(S),
    Fail(LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// A ceiling of zero is treated as one attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Checks whether attempt `attempt + 1` may run after a retryable outcome.
    pub fn allow_retry(&self, attempt: u32, deadline: Option<Instant>) -> Result<(), LedgerError> {
        if attempt >= self.max_attempts {
            return Err(LedgerError::Server(format!(
                "version conflict persisted after {} attempt(s)",
                attempt
            )));
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(LedgerError::DeadlineExceeded { attempts: attempt });
            }
        }
        Ok(())
    }

    /// Drives `attempt` until it finishes, fails, or the policy refuses
    /// another try. Returns the value with the number of attempts used.
    pub async fn run<S, T, F, Fut>(
        &self,
        deadline: Option<Instant>,
        initial: S,
        mut attempt: F,
    ) -> Result<(T, u32), LedgerError>
    where
        F: FnMut(S, u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T, S>>,
    {
        let mut state = initial;
        let mut n = 1;
        loop {
            match attempt(state, n).await {
                AttemptOutcome::Done(value) => return Ok((value, n)),
                AttemptOutcome::Fail(err) => return Err(err),
                AttemptOutcome::Retry(next) => {
                    if let Err(err) = self.allow_retry(n, deadline) {
                        tracing::warn!(attempts = n, error = %err, "giving up on ledger attempt");
                        return Err(err);
                    }
                    tracing::debug!(attempt = n, "retrying after version conflict");
                    state = next;
                    n += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn conflict() -> LedgerError {
        LedgerError::VersionConflict {
            wallet_id: Uuid::nil(),
            expected_version: 0,
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();
        let (value, attempts) = policy
            .run(None, 0u32, |seen, n| async move {
                if n < 3 {
                    AttemptOutcome::Retry(seen + 1)
                } else {
                    AttemptOutcome::Done(seen)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_becomes_server_error() {
        let policy = RetryPolicy::new(3);
        let mut calls = 0;
        let err = policy
            .run(None, (), |_, _| {
                calls += 1;
                async { AttemptOutcome::<(), ()>::Retry(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 3);
        assert!(matches!(err, LedgerError::Server(_)));
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let err = policy
            .run(None, (), |_, _| {
                calls += 1;
                async {
                    AttemptOutcome::<(), ()>::Fail(LedgerError::WalletNotFound("w".to_string()))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, LedgerError::WalletNotFound(_)));
    }

    #[tokio::test]
    async fn test_passed_deadline_stops_between_attempts() {
        let policy = RetryPolicy::new(5);
        let deadline = Instant::now() - Duration::from_millis(1);
        let err = policy
            .run(Some(deadline), (), |_, _| async {
                AttemptOutcome::<(), ()>::Retry(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::DeadlineExceeded { attempts: 1 }));
    }

    #[test]
    fn test_zero_ceiling_still_allows_one_attempt() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.allow_retry(1, None).is_err());
        assert!(conflict().is_retryable());
    }
}
