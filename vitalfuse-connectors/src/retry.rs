//! Bounded retry with exponential backoff and per-attempt timeout

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::ConnectorError;

/// Retry schedule for store writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after the first failure (ms)
    pub base_delay_ms: u64,
    /// Upper bound on any single delay (ms)
    pub max_delay_ms: u64,
    /// Deadline for one attempt (ms)
    pub attempt_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
            attempt_timeout_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Set the attempt count
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the first backoff delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-attempt deadline
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.max_attempts == 0 {
            return Err(ConnectorError::Config("max_attempts must be at least 1".into()));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConnectorError::Config("attempt_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Run `op` until it succeeds, fails permanently or attempts run out
    ///
    /// Returns the number of attempts used alongside the value. Exhaustion
    /// is reported as `PersistenceWriteFailure` for `subject_id`.
    pub async fn run<T, F, Fut>(&self, subject_id: &str, mut op: F) -> Result<(T, u32), ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let attempts = self.max_attempts.max(1);
        let timeout = self.attempt_timeout();

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::Timeout(timeout)),
            };

            match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    log::warn!(
                        "subject {}: write attempt {}/{} failed: {}",
                        subject_id,
                        attempt,
                        attempts,
                        err
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.delay(attempt)).await;
                    }
                }
            }
        }

        Err(ConnectorError::PersistenceWriteFailure {
            subject_id: subject_id.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(400));
        assert_eq!(policy.delay(20), Duration::from_millis(5_000));
        assert_eq!(policy.delay(200), Duration::from_millis(5_000));
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let (value, attempts) = RetryPolicy::default()
            .run("s1", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ConnectorError::Unavailable("busy".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_names_subject_and_attempts() {
        let err = RetryPolicy::default()
            .with_max_attempts(3)
            .run("s9", || async { Err::<(), _>(ConnectorError::Unavailable("down".into())) })
            .await
            .unwrap_err();
        match err {
            ConnectorError::PersistenceWriteFailure { subject_id, attempts } => {
                assert_eq!(subject_id, "s9");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_millis(50));
        let result = policy
            .run("s1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, ConnectorError>(())
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::PersistenceWriteFailure { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("s1", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ConnectorError::Config("no endpoint".into()))
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
