//! Caller-level retry for lock conflicts and a full lock table.
//!
//! Locks and the allocator never retry on their own. Front ends that want to
//! ride out a busy lock table wrap individual operations in [`retry`].

use std::thread;
use std::time::Duration;

use nfv_config::{log_lock_debug, LockConfig};
use tracing::field::display;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts
    pub wait: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(wait: Duration, max_retries: u32) -> Self {
        Self { wait, max_retries }
    }

    /// Fail on the first error.
    pub fn never() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn from_config(config: &LockConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_wait_ms),
            config.max_retries,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}

/// Run `op`, repeating it after `policy.wait` while it fails with a
/// retryable error and attempts remain. Other errors return immediately.
pub fn retry<T>(policy: &RetryPolicy, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                log_lock_debug!(
                    "Retrying lock operation",
                    attempt = attempt,
                    max_retries = policy.max_retries,
                    error = display(&err),
                );
                thread::sleep(policy.wait);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockError;
    use std::io;

    fn busy() -> LockError {
        LockError::Io(io::Error::from(io::ErrorKind::WouldBlock))
    }

    #[test]
    fn test_retries_until_success() {
        let policy = RetryPolicy::new(Duration::ZERO, 5);
        let mut calls = 0;
        let value = retry(&policy, || {
            calls += 1;
            if calls < 3 {
                Err(busy())
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(Duration::ZERO, 2);
        let mut calls = 0;
        let result: Result<()> = retry(&policy, || {
            calls += 1;
            Err(busy())
        });
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_returns_immediately() {
        let mut calls = 0;
        let result: Result<()> = retry(&RetryPolicy::default(), || {
            calls += 1;
            Err(LockError::InvalidState("already on".to_string()))
        });
        assert!(matches!(result, Err(LockError::InvalidState(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait, Duration::from_millis(500));
        assert_eq!(policy.max_retries, 10);
        assert_eq!(RetryPolicy::never().max_retries, 0);
    }
}
