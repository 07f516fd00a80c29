//! Retry scheduling
//!
//! Design: each attempt reports an explicit [`Attempt`] outcome and
//! [`retry`] drives a bounded loop over them. Backoff between attempts
//! follows `min_timeout * factor^n`, optionally scaled by a random factor
//! in `[1, 2)`, and capped at `max_timeout`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff and bound configuration for the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Exponential growth factor
    pub factor: f64,
    /// Delay before the first retry
    pub min_timeout: Duration,
    /// Upper bound for any delay
    pub max_timeout: Option<Duration>,
    /// Scale each delay by a random factor between 1 and 2
    #[serde(default)]
    pub randomize: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            factor: 2.0,
            min_timeout: Duration::from_secs(1),
            max_timeout: None,
            randomize: false,
        }
    }
}

impl RetryPolicy {
    /// Policy allowing `retries` retries with default backoff
    pub fn with_retries(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    /// Policy allowing `retries` retries with no wait between attempts
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            factor: 0.0,
            min_timeout: Duration::ZERO,
            max_timeout: None,
            randomize: false,
        }
    }

    /// Total number of attempts, including the first one
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay before the retry with the given 0-based index
    pub fn delay(&self, retry_index: u32) -> Duration {
        let random = if self.randomize {
            1.0 + rand::random::<f64>()
        } else {
            1.0
        };
        self.scaled_delay(retry_index, random)
    }

    fn scaled_delay(&self, retry_index: u32, random: f64) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let secs = random * self.min_timeout.as_secs_f64() * self.factor.powi(exponent);
        // NaN and negative products collapse to zero
        let delay = if secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };

        match self.max_timeout {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Stop with a value
    Success(T),
    /// Try again, remembering the error that caused it, if any
    Retry(Option<E>),
    /// Stop with an error
    Fail(E),
}

/// Terminal failure of the retry loop
#[derive(Debug)]
pub enum RetryError<E> {
    /// An attempt gave up
    Failed(E),
    /// Every attempt asked for a retry
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt, if it carried one
        last: Option<E>,
    },
}

/// Run `attempt` until it succeeds, fails, or the policy runs out
///
/// Attempts are numbered from 1 and run strictly one after another.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut number = 1;

    loop {
        match attempt(number).await {
            Attempt::Success(value) => return Ok(value),
            Attempt::Fail(err) => return Err(RetryError::Failed(err)),
            Attempt::Retry(last) => {
                if number >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: number,
                        last,
                    });
                }

                let delay = policy.delay(number - 1);
                warn!(
                    attempt = number,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying request"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                number += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retries, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.factor, 2.0);
        assert_eq!(policy.min_timeout, Duration::from_secs(1));
        assert!(policy.max_timeout.is_none());
        assert!(!policy.randomize);
    }

    #[test]
    fn test_immediate_policy() {
        let policy = RetryPolicy::immediate(4);
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(3), Duration::ZERO);
    }

    #[test]
    fn test_randomized_delay_within_bounds() {
        let policy = RetryPolicy {
            randomize: true,
            ..RetryPolicy::with_retries(3)
        };
        for _ in 0..50 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay < Duration::from_secs(4));
        }

        assert_eq!(policy.scaled_delay(2, 1.5), Duration::from_secs(6));
    }

    #[test]
    fn test_randomized_delay_capped() {
        let policy = RetryPolicy {
            randomize: true,
            max_timeout: Some(Duration::from_millis(1500)),
            ..RetryPolicy::with_retries(3)
        };
        assert_eq!(policy.scaled_delay(0, 1.75), Duration::from_millis(1500));
        assert_eq!(policy.scaled_delay(0, 1.25), Duration::from_millis(1250));
    }

    #[test]
    fn test_randomize_defaults_when_deserialized() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"retries":2,"factor":2.0,"min_timeout":{"secs":1,"nanos":0},"max_timeout":null}"#,
        )
        .unwrap();
        assert!(!policy.randomize);
        assert_eq!(policy.retries, 2);
    }

    #[test]
    fn test_exponential_delay() {
        let policy = RetryPolicy::with_retries(3);
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_timeout: Some(Duration::from_millis(2500)),
            ..RetryPolicy::with_retries(5)
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_millis(2500));
    }

    #[test]
    fn test_zero_factor_delay() {
        let policy = RetryPolicy {
            factor: 0.0,
            ..RetryPolicy::with_retries(2)
        };
        // factor^0 is 1, so only the first retry waits
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::ZERO);
    }

    #[test]
    fn test_negative_factor_delay() {
        let policy = RetryPolicy {
            factor: -2.0,
            ..RetryPolicy::with_retries(2)
        };
        assert_eq!(policy.delay(1), Duration::ZERO);
    }

    #[test]
    fn test_max_attempts_saturates() {
        assert_eq!(RetryPolicy::with_retries(u32::MAX).max_attempts(), u32::MAX);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let mut calls = 0;
        let result: Result<u32, RetryError<()>> = retry(&RetryPolicy::immediate(5), |n| {
            calls += 1;
            async move { Attempt::Success(n) }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let mut calls = 0;
        let result: Result<(), RetryError<String>> = retry(&RetryPolicy::immediate(5), |n| {
            calls += 1;
            async move { Attempt::Retry(Some(format!("attempt {}", n))) }
        })
        .await;
        assert_eq!(calls, 6);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 6);
                assert_eq!(last.as_deref(), Some("attempt 6"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let result: Result<u32, RetryError<()>> = retry(&RetryPolicy::immediate(5), |n| async move {
            if n < 3 {
                Attempt::Retry(None)
            } else {
                Attempt::Success(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_fail_stops_loop() {
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> = retry(&RetryPolicy::immediate(5), |_| {
            calls += 1;
            async { Attempt::Fail("broken") }
        })
        .await;
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RetryError::Failed("broken"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_between_attempts() {
        let policy = RetryPolicy {
            retries: 2,
            factor: 2.0,
            min_timeout: Duration::from_millis(100),
            max_timeout: None,
            randomize: false,
        };
        let started = tokio::time::Instant::now();
        let result: Result<(), RetryError<()>> =
            retry(&policy, |_| async { Attempt::Retry(None) }).await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: None
            })
        ));
        // 100ms + 200ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
