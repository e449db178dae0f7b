//! Bounded polling with a linearly growing delay.
//!
//! [`RetryPolicy::retry`] runs an operation until its result is "ready",
//! sleeping `i × base_delay` after the *i*-th unready attempt.  It backs both
//! the `poll(...)` condition capability and the wait for a freshly launched
//! window to appear.
//!
//! The calling thread is blocked while sleeping; there is no way to cancel
//! a retry other than running out of attempts.

use log::debug;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// How many times to try and how long to back off in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts (including the first).  `0` behaves like `1`.
    pub max_attempts: u32,
    /// Unit of the back-off: the delay after attempt *i* is `i × base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 9,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// What to do once every attempt came back unready.
#[derive(Debug, Clone, PartialEq)]
pub enum OnExhaustion<T> {
    /// Fail with a [`TimedOut`] carrying this message.
    Fail(String),
    /// Return this value instead.
    Fallback(T),
}

/// Every attempt was made and none was ready.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (gave up after {attempts} attempts)")]
pub struct TimedOut {
    pub message: String,
    pub attempts: u32,
}

/// Serialized form of a [`RetryPolicy`] in the application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts.  Default: `9`.
    pub max_attempts: u32,
    /// Back-off unit in milliseconds.  Default: `100`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The sleeps taken between attempts, in order, when nothing is ready.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay;
        (1..self.attempts()).map(move |attempt| base * attempt)
    }

    /// Run `operation` until `is_ready` accepts its result.
    ///
    /// The first attempt runs immediately.  An `Err` from `operation` is
    /// returned straight away; only unready results are retried.
    pub fn retry<T, E, F, P>(
        &self,
        mut operation: F,
        is_ready: P,
        on_exhaustion: OnExhaustion<T>,
    ) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&T) -> bool,
        E: From<TimedOut>,
    {
        let attempts = self.attempts();
        for attempt in 1..=attempts {
            let result = operation()?;
            if is_ready(&result) {
                debug!("ready after attempt {}/{}", attempt, attempts);
                return Ok(result);
            }
            if attempt < attempts {
                let delay = self.base_delay * attempt;
                debug!(
                    "attempt {}/{} not ready, retrying in {:?}",
                    attempt, attempts, delay
                );
                thread::sleep(delay);
            }
        }

        match on_exhaustion {
            OnExhaustion::Fallback(value) => {
                debug!("all {} attempts unready, using fallback", attempts);
                Ok(value)
            }
            OnExhaustion::Fail(message) => Err(TimedOut { message, attempts }.into()),
        }
    }

    /// Retry an operation that reports "not yet" as `None`.
    pub fn wait_for<T, E, F>(&self, mut operation: F, message: impl Into<String>) -> Result<T, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
        E: From<TimedOut>,
    {
        let message = message.into();
        let found = self.retry(
            &mut operation,
            Option::is_some,
            OnExhaustion::Fail(message.clone()),
        )?;
        found.ok_or_else(|| {
            TimedOut {
                message,
                attempts: self.attempts(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("timed out: {0}")]
        TimedOut(#[from] TimedOut),
        #[error("boom")]
        Boom,
    }

    #[test]
    fn default_policy_matches_documented_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 9);
        assert_eq!(policy.base_delay, Duration::from_millis(100));
    }

    #[test]
    fn delay_grows_linearly_and_skips_the_last_attempt() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
    }

    #[test]
    fn first_ready_result_is_returned_immediately() {
        let calls = Cell::new(0);
        let result: Result<u32, TestError> = instant(9).retry(
            || {
                calls.set(calls.get() + 1);
                Ok(7)
            },
            |_| true,
            OnExhaustion::Fail("never".into()),
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn succeeds_on_third_attempt_without_a_fourth() {
        let calls = Cell::new(0u32);
        let result: Result<u32, TestError> = instant(3).retry(
            || {
                calls.set(calls.get() + 1);
                Ok(calls.get())
            },
            |attempt| *attempt == 3,
            OnExhaustion::Fail("never ready".into()),
        );
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhaustion_without_fallback_times_out_with_message() {
        let calls = Cell::new(0u32);
        let result: Result<bool, TestError> = instant(4).retry(
            || {
                calls.set(calls.get() + 1);
                Ok(false)
            },
            |ready| *ready,
            OnExhaustion::Fail("dependency never came up".into()),
        );
        assert_eq!(
            result,
            Err(TestError::TimedOut(TimedOut {
                message: "dependency never came up".into(),
                attempts: 4,
            }))
        );
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn exhaustion_with_fallback_returns_the_fallback() {
        let result: Result<i32, TestError> =
            instant(3).retry(|| Ok(-1), |v| *v > 0, OnExhaustion::Fallback(42));
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn operation_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<u32, TestError> = instant(5).retry(
            || {
                calls.set(calls.get() + 1);
                Err(TestError::Boom)
            },
            |_| true,
            OnExhaustion::Fail("unused".into()),
        );
        assert_eq!(result, Err(TestError::Boom));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let calls = Cell::new(0);
        let result: Result<(), TestError> = instant(0).retry(
            || {
                calls.set(calls.get() + 1);
                Ok(())
            },
            |_| false,
            OnExhaustion::Fallback(()),
        );
        assert_eq!(result, Ok(()));
        assert_eq!(calls.get(), 1);
        assert_eq!(instant(0).delays().count(), 0);
    }

    #[test]
    fn wait_for_unwraps_the_found_value() {
        let calls = Cell::new(0);
        let result: Result<&str, TestError> = instant(5).wait_for(
            || {
                calls.set(calls.get() + 1);
                Ok((calls.get() == 2).then_some("window"))
            },
            "waiting",
        );
        assert_eq!(result, Ok("window"));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn wait_for_times_out_when_nothing_shows_up() {
        let result: Result<(), TestError> = instant(2).wait_for(|| Ok(None), "no window");
        assert_eq!(
            result,
            Err(TestError::TimedOut(TimedOut {
                message: "no window".into(),
                attempts: 2,
            }))
        );
    }

    #[test]
    fn real_sleeps_follow_the_schedule() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let started = std::time::Instant::now();
        let _: Result<bool, TestError> =
            policy.retry(|| Ok(false), |v| *v, OnExhaustion::Fallback(false));
        // 5ms after attempt 1, 10ms after attempt 2, nothing after attempt 3.
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn config_converts_to_policy() {
        let config: RetryConfig =
            serde_json::from_str(r#"{ "max_attempts": 3, "base_delay_ms": 250 }"#).unwrap();
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy, RetryPolicy::new(3, Duration::from_millis(250)));

        let defaults: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(RetryPolicy::from(&defaults), RetryPolicy::default());
    }
}
