//! Rate-limit retries with a staged, randomized backoff.
//!
//! Only the backend's application-level throttling signal triggers a retry by
//! default (see [`crate::rate_limit::is_rate_exceeded`]). Ordinary HTTP errors,
//! decode failures and network errors are returned on the first attempt.

use crate::{
    error::{ErrorKind, NO_STATUS},
    rate_limit::{is_rate_exceeded, RetryConf},
    ClientError, Result,
};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Returns the delay to sleep before the given attempt (1-indexed).
///
/// * attempt 1: uniform in `[min_starting_delay, max_starting_delay]`
/// * attempts 2 and 3: uniform in `[min_delay, max_delay]`
/// * later attempts: uniform in
///   `[min_jitter_delay, min_jitter_delay + attempt * min_starting_delay]`
///
/// # Examples
///
/// ```
/// use duplo_sdk::{rate_limit::RetryConf, retry::backoff_interval};
/// use std::time::Duration;
///
/// let delay = backoff_interval(1, &RetryConf::default(), &mut rand::thread_rng());
/// assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(7));
/// ```
pub fn backoff_interval<R: Rng>(attempt: u32, conf: &RetryConf, rng: &mut R) -> Duration {
    let (min, max) = match attempt {
        0 | 1 => (conf.min_starting_delay, conf.max_starting_delay),
        2 | 3 => (conf.min_delay, conf.max_delay),
        _ => (
            conf.min_jitter_delay,
            conf.min_jitter_delay
                .saturating_add(u64::from(attempt).saturating_mul(conf.min_starting_delay)),
        ),
    };
    let secs = rng.gen_range(min..=max.max(min));
    Duration::from_secs(secs)
}

/// Trait for deciding whether a failed call should be attempted again.
///
/// # Examples
///
/// ```
/// use duplo_sdk::{ClientError, RetryPredicate};
///
/// struct RetryOnConflict;
///
/// impl RetryPredicate for RetryOnConflict {
///     fn should_retry(&self, error: &ClientError, _attempt: u32) -> bool {
///         error.status() == 409
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the call that failed with `error` on `attempt`
    /// (1-indexed) should be retried.
    fn should_retry(&self, error: &ClientError, attempt: u32) -> bool;
}

/// Retry when the backend reports `"Rate exceeded"`. This is the default.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRateExceeded;

impl RetryPredicate for RetryOnRateExceeded {
    fn should_retry(&self, error: &ClientError, _attempt: u32) -> bool {
        is_rate_exceeded(error)
    }
}

/// Retry on Azure-style timeout messages (containing `HRESULT`) and on 400
/// responses that carried no message of their own.
///
/// Some Azure backed APIs fail transiently this way. Not enabled by default.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeoutOr400;

impl RetryPredicate for RetryOnTimeoutOr400 {
    fn should_retry(&self, error: &ClientError, _attempt: u32) -> bool {
        match error.response_message() {
            Some(message) if message.contains("HRESULT") => true,
            // A synthesized message means the server sent none.
            Some(message) => error.status() == 400 && message == error.message(),
            None => error.status() == 400,
        }
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// # Examples
///
/// ```
/// use duplo_sdk::retry::{OrPredicate, RetryOnRateExceeded, RetryOnTimeoutOr400};
///
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOnRateExceeded),
///     Box::new(RetryOnTimeoutOr400),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, error: &ClientError, attempt: u32) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(error, attempt))
    }
}

/// Runs `operation` until it succeeds, fails with an error the predicate
/// rejects, or `conf.max_attempts` attempts have been made.
///
/// A randomized delay from [`backoff_interval`] is slept before every
/// attempt, the first one included. `caller` only labels log lines and the
/// exhaustion error.
///
/// # Errors
///
/// Returns the first error the predicate does not retry, or an
/// [`ErrorKind::RetriesExhausted`] error reporting the total time slept and
/// the number of attempts.
pub async fn retry_api_call<T, F, Fut>(
    caller: &str,
    conf: &RetryConf,
    predicate: &dyn RetryPredicate,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut total_sleep = Duration::ZERO;
    let mut attempts = 0;

    for attempt in 1..=conf.max_attempts {
        let delay = backoff_interval(attempt, conf, &mut rand::thread_rng());
        total_sleep += delay;
        tracing::trace!(
            api = %caller,
            attempt = attempt,
            sleep_secs = delay.as_secs(),
            "sleeping before attempt"
        );
        tokio::time::sleep(delay).await;

        attempts = attempt;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !predicate.should_retry(&err, attempt) {
            return Err(err);
        }

        tracing::warn!(
            api = %caller,
            attempt = attempt,
            total_sleep_secs = total_sleep.as_secs(),
            error = %err,
            "retryable failure"
        );
    }

    Err(ClientError::new(
        ErrorKind::RetriesExhausted,
        NO_STATUS,
        "",
        format!(
            "API_RETRIES: Max retry attempts exceeded. (total_sleep, retry_attempts, api) ({},{},{})",
            total_sleep.as_secs(),
            attempts,
            caller
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rand::{rngs::StdRng, SeedableRng};
    use std::future::ready;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_exceeded() -> ClientError {
        ClientError::custom("Rate exceeded", 400)
    }

    #[test]
    fn test_backoff_bounds() {
        let conf = RetryConf::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let first = backoff_interval(1, &conf, &mut rng).as_secs();
            assert!((1..=7).contains(&first), "attempt 1 slept {}", first);

            for attempt in 2..=3 {
                let secs = backoff_interval(attempt, &conf, &mut rng).as_secs();
                assert!((3..=15).contains(&secs), "attempt {} slept {}", attempt, secs);
            }

            for attempt in 4..=12u32 {
                let secs = backoff_interval(attempt, &conf, &mut rng).as_secs();
                let upper = 6 + u64::from(attempt);
                assert!((6..=upper).contains(&secs), "attempt {} slept {}", attempt, secs);
            }
        }
    }

    #[test]
    fn test_backoff_tolerates_inverted_bounds() {
        let conf = RetryConf::builder().starting_delay(5, 2).build();
        let secs = backoff_interval(1, &conf, &mut rand::thread_rng()).as_secs();
        assert_eq!(secs, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call("GET (x, y)", &RetryConf::default(), &RetryOnRateExceeded, || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(Ok::<_, ClientError>(42))
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call("GET (x, y)", &RetryConf::default(), &RetryOnRateExceeded, || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(Err::<(), _>(ClientError::custom("Not found", 404)))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_exceeded_until_exhausted() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let result = retry_api_call("GET (x, y)", &RetryConf::default(), &RetryOnRateExceeded, || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(Err::<(), _>(rate_exceeded()))
        })
        .await;
        let slept = start.elapsed().as_secs();

        assert_eq!(calls.load(Ordering::SeqCst), 9);
        // 1 + 3 + 3 + 6 * 6 at least, 7 + 15 + 15 + (10..=15) at most
        assert!((43..=112).contains(&slept), "slept {}", slept);

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(err.status(), -1);
        assert_eq!(
            err.message(),
            format!(
                "API_RETRIES: Max retry attempts exceeded. (total_sleep, retry_attempts, api) ({},9,GET (x, y))",
                slept
            )
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_rate_exceeded() {
        let calls = AtomicU32::new(0);
        let result = retry_api_call("POST (x, y)", &RetryConf::default(), &RetryOnRateExceeded, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            ready(if n < 2 { Err(rate_exceeded()) } else { Ok("done") })
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_timeout_or_400_predicate() {
        let predicate = RetryOnTimeoutOr400;
        let hresult = ClientError::custom("Exception from HRESULT: 0x80131904", 500);
        assert!(predicate.should_retry(&hresult, 1));

        let bare_400 = ClientError::http(400, "http://h/x", "url: http://h/x, status: 400", Default::default());
        assert!(predicate.should_retry(&bare_400, 1));

        let mut body = serde_json::Map::new();
        body.insert("Message".to_string(), serde_json::json!("Invalid name"));
        let explained_400 = ClientError::http(400, "http://h/x", "url: http://h/x, status: 400", body);
        assert!(!predicate.should_retry(&explained_400, 1));

        assert!(!predicate.should_retry(&ClientError::custom("Not found", 404), 1));
    }

    #[test]
    fn test_or_predicate() {
        let predicate = OrPredicate::new(vec![
            Box::new(RetryOnRateExceeded),
            Box::new(RetryOnTimeoutOr400),
        ]);
        assert!(predicate.should_retry(&rate_exceeded(), 1));
        assert!(predicate.should_retry(&ClientError::custom("HRESULT 0x1", 500), 1));
        assert!(!predicate.should_retry(&ClientError::custom("Not found", 404), 1));
    }
}
