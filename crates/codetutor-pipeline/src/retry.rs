use codetutor_core::config_manager::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Attempt budget with a constant pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, never less than one
    pub max_attempts: u32,
    pub wait: Duration,
}

/// The operation failed on every attempt.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: anyhow::Error,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds or the budget is spent. `op` receives the
    /// 1-based attempt number; on success the attempt count is returned with
    /// the value.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        "{} attempt {}/{} failed: {:#}; retrying in {:?}",
                        label, attempt, self.max_attempts, e, self.wait
                    );
                    if !self.wait.is_zero() {
                        tokio::time::sleep(self.wait).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: e,
                    })
                }
            }
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        RetryPolicy::new(settings.max_retries, Duration::from_secs(settings.wait_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let (value, attempts) = policy
            .run("test", move |_| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("transient"))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = policy
            .run("test", |n| async move { Err::<(), _>(anyhow!("failure {}", n)) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(err.last_error.to_string(), "failure 2");
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let policy = RetryPolicy::from(RetrySettings::new(0, 5));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.wait, Duration::from_secs(5));
    }
}
