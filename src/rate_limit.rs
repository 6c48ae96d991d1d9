//! Detection of the backend's "Rate exceeded" signal and the retry settings
//! used when it is seen.
//!
//! Throttling is reported by the Duplo backend in the body of an ordinary
//! error response rather than with a dedicated status code, so it is detected
//! by matching the `"Message"` field of the parsed error body.

use crate::ClientError;

/// The exact `"Message"` value the backend returns when throttled.
pub const RATE_EXCEEDED_MSG: &str = "Rate exceeded";

/// Returns `true` if the error carries the backend's rate-limit message.
///
/// The match is exact and case sensitive.
///
/// # Examples
///
/// ```
/// use duplo_sdk::{rate_limit::is_rate_exceeded, ClientError};
///
/// assert!(is_rate_exceeded(&ClientError::custom("Rate exceeded", 400)));
/// assert!(!is_rate_exceeded(&ClientError::custom("rate exceeded", 400)));
/// ```
pub fn is_rate_exceeded(err: &ClientError) -> bool {
    let detected = err.response_message() == Some(RATE_EXCEEDED_MSG);
    if detected {
        tracing::debug!(url = %err.url(), status = err.status(), "rate exceeded detected");
    }
    detected
}

/// Attempt ceiling and backoff bounds for rate-limit retries.
///
/// All delays are whole seconds.
///
/// # Examples
///
/// ```
/// use duplo_sdk::rate_limit::RetryConf;
///
/// let conf = RetryConf::builder()
///     .max_attempts(4)
///     .starting_delay(0, 1)
///     .build();
/// assert_eq!(conf.max_attempts, 4);
/// assert_eq!(conf.min_delay, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConf {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,

    /// Lower bound of the delay before the first attempt. Also the per-attempt
    /// growth of the upper bound from the fourth attempt on.
    pub min_starting_delay: u64,

    /// Upper bound of the delay before the first attempt.
    pub max_starting_delay: u64,

    /// Lower bound of the delay before attempts two and three.
    pub min_delay: u64,

    /// Upper bound of the delay before attempts two and three.
    pub max_delay: u64,

    /// Lower bound of the delay from the fourth attempt on.
    pub min_jitter_delay: u64,
}

impl Default for RetryConf {
    fn default() -> Self {
        Self {
            max_attempts: 9,
            min_starting_delay: 1,
            max_starting_delay: 7,
            min_delay: 3,
            max_delay: 15,
            min_jitter_delay: 6,
        }
    }
}

impl RetryConf {
    /// Creates a new builder starting from the default settings.
    pub fn builder() -> RetryConfBuilder {
        RetryConfBuilder::default()
    }

    /// A configuration that never sleeps. Useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_starting_delay: 0,
            max_starting_delay: 0,
            min_delay: 0,
            max_delay: 0,
            min_jitter_delay: 0,
        }
    }
}

/// Builder for `RetryConf`.
#[derive(Default)]
pub struct RetryConfBuilder {
    max_attempts: Option<u32>,
    starting_delay: Option<(u64, u64)>,
    delay: Option<(u64, u64)>,
    min_jitter_delay: Option<u64>,
}

impl RetryConfBuilder {
    /// Sets the total number of attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the bounds, in seconds, of the delay before the first attempt.
    pub fn starting_delay(mut self, min: u64, max: u64) -> Self {
        self.starting_delay = Some((min, max));
        self
    }

    /// Sets the bounds, in seconds, of the delay before attempts two and three.
    pub fn delay(mut self, min: u64, max: u64) -> Self {
        self.delay = Some((min, max));
        self
    }

    /// Sets the lower bound, in seconds, of later delays.
    pub fn min_jitter_delay(mut self, min: u64) -> Self {
        self.min_jitter_delay = Some(min);
        self
    }

    /// Builds the `RetryConf`.
    pub fn build(self) -> RetryConf {
        let default = RetryConf::default();
        let (min_starting_delay, max_starting_delay) = self
            .starting_delay
            .unwrap_or((default.min_starting_delay, default.max_starting_delay));
        let (min_delay, max_delay) = self.delay.unwrap_or((default.min_delay, default.max_delay));
        RetryConf {
            max_attempts: self.max_attempts.unwrap_or(default.max_attempts),
            min_starting_delay,
            max_starting_delay,
            min_delay,
            max_delay,
            min_jitter_delay: self.min_jitter_delay.unwrap_or(default.min_jitter_delay),
        }
    }
}
