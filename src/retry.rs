//! Retry policies and predicates for handling transient failures.
//!
//! A [`RetryPolicy`] can be configured per backend and per call. The call's
//! policy overlays the backend's field by field; without either, a call is
//! attempted exactly once.
//!
//! The delay before retry `n` (counting from zero) is
//! `min(r * min_timeout * factor^n, max_timeout)` where `r` is drawn from
//! `[1, 2)` when `randomize` is set and is `1` otherwise.

use crate::{Error, Response};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retries when no policy field says otherwise.
pub const DEFAULT_RETRIES: u32 = 10;
/// Exponential factor when none is configured.
pub const DEFAULT_FACTOR: f64 = 2.0;
/// Delay before the first retry when none is configured.
pub const DEFAULT_MIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often and how patiently to retry a call.
///
/// Unset fields fall back first to the backend policy and then to the
/// defaults: 10 retries, factor 2, 1 second minimum delay, no maximum delay,
/// no randomization, retry on any error.
///
/// # Examples
///
/// ```
/// use backend_request::{RetryPolicy, retry::{OrPredicate, RetryOnError, RetryOnStatus}};
/// use std::time::Duration;
///
/// // retry errors and 429 answers, at most 3 times
/// let policy = RetryPolicy::new()
///     .retries(3)
///     .min_timeout(Duration::from_millis(300))
///     .max_timeout(Duration::from_secs(6))
///     .randomize(true)
///     .test(OrPredicate::new(vec![
///         Box::new(RetryOnError),
///         Box::new(RetryOnStatus(429)),
///     ]));
/// assert_eq!(policy.resolve().retries, 3);
/// ```
#[derive(Clone, Default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub retries: Option<u32>,
    /// Exponential growth of the delay.
    pub factor: Option<f64>,
    /// Delay before the first retry.
    pub min_timeout: Option<Duration>,
    /// Upper bound of any delay.
    pub max_timeout: Option<Duration>,
    /// Multiply delays by a random factor between 1 and 2.
    pub randomize: Option<bool>,
    /// Decides whether an outcome is retried; by default any error is.
    pub test: Option<Arc<dyn RetryPredicate>>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("factor", &self.factor)
            .field("min_timeout", &self.min_timeout)
            .field("max_timeout", &self.max_timeout)
            .field("randomize", &self.randomize)
            .field("test", &self.test.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RetryPolicy {
    /// Creates a policy with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets the exponential factor.
    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    /// Sets the delay before the first retry.
    pub fn min_timeout(mut self, timeout: Duration) -> Self {
        self.min_timeout = Some(timeout);
        self
    }

    /// Caps every delay.
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    /// Enables or disables randomized delays.
    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = Some(randomize);
        self
    }

    /// Sets the predicate deciding which outcomes are retried.
    pub fn test(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.test = Some(Arc::new(predicate));
        self
    }

    /// Fills every unset field of `self` from `lower`.
    pub fn or(self, lower: &RetryPolicy) -> Self {
        Self {
            retries: self.retries.or(lower.retries),
            factor: self.factor.or(lower.factor),
            min_timeout: self.min_timeout.or(lower.min_timeout),
            max_timeout: self.max_timeout.or(lower.max_timeout),
            randomize: self.randomize.or(lower.randomize),
            test: self.test.or_else(|| lower.test.clone()),
        }
    }

    /// Combines a call policy with a backend policy; `None` when neither exists.
    pub fn merged(call: Option<&RetryPolicy>, config: Option<&RetryPolicy>) -> Option<RetryPolicy> {
        match (call, config) {
            (None, None) => None,
            (Some(call), None) => Some(call.clone()),
            (None, Some(config)) => Some(config.clone()),
            (Some(call), Some(config)) => Some(call.clone().or(config)),
        }
    }

    /// Applies the defaults to every unset field.
    pub fn resolve(&self) -> Backoff {
        Backoff {
            retries: self.retries.unwrap_or(DEFAULT_RETRIES),
            factor: self.factor.unwrap_or(DEFAULT_FACTOR),
            min_timeout: self.min_timeout.unwrap_or(DEFAULT_MIN_TIMEOUT),
            max_timeout: self.max_timeout,
            randomize: self.randomize.unwrap_or(false),
        }
    }
}

/// A fully resolved backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Maximum number of retries.
    pub retries: u32,
    /// Exponential factor.
    pub factor: f64,
    /// Delay before the first retry.
    pub min_timeout: Duration,
    /// Upper bound of any delay, unbounded when `None`.
    pub max_timeout: Option<Duration>,
    /// Randomize delays.
    pub randomize: bool,
}

impl Backoff {
    /// Returns the delay before retry `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let random = if self.randomize {
            rand::thread_rng().gen_range(1.0..2.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = random * self.min_timeout.as_millis() as f64 * self.factor.powi(exponent);
        let delay = if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis.max(0.0).round() as u64)
        } else {
            Duration::MAX
        };
        match self.max_timeout {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// Bookkeeping for one retried call.
///
/// ```
/// use backend_request::{RetryPolicy, retry::RetryOperation};
///
/// let mut operation = RetryOperation::new(RetryPolicy::new().retries(1).resolve());
/// assert_eq!(operation.attempt(), 1);
/// assert!(operation.retry(true).is_some());
/// assert_eq!(operation.attempt(), 2);
/// assert!(operation.retry(true).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RetryOperation {
    backoff: Backoff,
    attempts: usize,
    retries: u32,
}

impl RetryOperation {
    /// Starts an operation following `backoff`.
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            attempts: 0,
            retries: 0,
        }
    }

    /// Registers the next attempt and returns its number (1-indexed).
    pub fn attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    /// Number of attempts registered so far.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Decides on another attempt after the current one.
    ///
    /// Returns the delay to wait before it, or `None` when `should_retry` is
    /// `false` or the retry budget is spent.
    pub fn retry(&mut self, should_retry: bool) -> Option<Duration> {
        if !should_retry || self.retries >= self.backoff.retries {
            return None;
        }
        let delay = self.backoff.delay_for_retry(self.retries);
        self.retries += 1;
        Some(delay)
    }
}

/// Decides whether the outcome of an attempt should be retried.
///
/// `error` and `response` are exclusive: a completed exchange, whatever its
/// status, arrives as a response. Closures with the same signature implement
/// the trait.
///
/// # Examples
///
/// ```
/// use backend_request::{Error, Response, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, error: Option<&Error>, response: Option<&Response>) -> bool {
///         error.is_some() || response.is_some_and(|r| r.status.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` to try again.
    fn should_retry(&self, error: Option<&Error>, response: Option<&Response>) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(Option<&Error>, Option<&Response>) -> bool + Send + Sync,
{
    fn should_retry(&self, error: Option<&Error>, response: Option<&Response>) -> bool {
        self(error, response)
    }
}

/// Retry whenever the attempt failed with an error. This is the default.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnError;

impl RetryPredicate for RetryOnError {
    fn should_retry(&self, error: Option<&Error>, _response: Option<&Response>) -> bool {
        error.is_some()
    }
}

/// Retry only on 5xx responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, _error: Option<&Error>, response: Option<&Response>) -> bool {
        response.is_some_and(|r| r.status.is_server_error())
    }
}

/// Retry only on transport timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, error: Option<&Error>, _response: Option<&Response>) -> bool {
        error.is_some_and(Error::is_timeout)
    }
}

/// Retry on responses with the given status, e.g. `429`.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnStatus(pub u16);

impl RetryPredicate for RetryOnStatus {
    fn should_retry(&self, _error: Option<&Error>, response: Option<&Response>) -> bool {
        response.is_some_and(|r| r.status.as_u16() == self.0)
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// Retries if ANY of the predicates return `true`.
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
    fn should_retry(&self, error: Option<&Error>, response: Option<&Response>) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(error, response))
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// Retries only if ALL of the predicates return `true`.
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, error: Option<&Error>, response: Option<&Response>) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(error, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportErrorKind};
    use http::StatusCode;

    fn response(status: u16) -> Response {
        Response::for_status(StatusCode::from_u16(status).unwrap())
    }

    #[test]
    fn test_exponential_delays() {
        let backoff = RetryPolicy::new()
            .retries(5)
            .min_timeout(Duration::from_millis(100))
            .max_timeout(Duration::from_millis(1000))
            .resolve();

        assert_eq!(backoff.delay_for_retry(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_retry(3), Duration::from_millis(800));
        assert_eq!(backoff.delay_for_retry(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_randomized_delays_stay_in_range() {
        let backoff = RetryPolicy::new()
            .factor(3.0)
            .min_timeout(Duration::from_millis(100))
            .randomize(true)
            .resolve();

        for _ in 0..100 {
            let delay = backoff.delay_for_retry(1);
            assert!(delay >= Duration::from_millis(300));
            assert!(delay <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_huge_exponents_saturate() {
        let backoff = RetryPolicy::new().resolve();
        assert_eq!(backoff.delay_for_retry(10_000), Duration::MAX);
        assert!(backoff.max_timeout.is_none());
    }

    #[test]
    fn test_defaults() {
        let backoff = RetryPolicy::new().resolve();
        assert_eq!(backoff.retries, 10);
        assert_eq!(backoff.factor, 2.0);
        assert_eq!(backoff.min_timeout, Duration::from_secs(1));
        assert!(!backoff.randomize);
    }

    #[test]
    fn test_call_policy_overlays_config_policy() {
        let config = RetryPolicy::new()
            .retries(5)
            .min_timeout(Duration::from_millis(300))
            .test(RetryOn5xx);
        let call = RetryPolicy::new().retries(1);

        let merged = RetryPolicy::merged(Some(&call), Some(&config)).unwrap();
        assert_eq!(merged.retries, Some(1));
        assert_eq!(merged.min_timeout, Some(Duration::from_millis(300)));
        assert!(merged.test.is_some());

        assert!(RetryPolicy::merged(None, None).is_none());
        assert_eq!(
            RetryPolicy::merged(None, Some(&config)).unwrap().retries,
            Some(5)
        );
    }

    #[test]
    fn test_operation_budget() {
        let mut operation = RetryOperation::new(
            RetryPolicy::new()
                .retries(2)
                .min_timeout(Duration::from_millis(10))
                .resolve(),
        );

        assert_eq!(operation.attempt(), 1);
        assert_eq!(operation.retry(true), Some(Duration::from_millis(10)));
        assert_eq!(operation.attempt(), 2);
        assert_eq!(operation.retry(true), Some(Duration::from_millis(20)));
        assert_eq!(operation.attempt(), 3);
        assert_eq!(operation.retry(true), None);
        assert_eq!(operation.attempts(), 3);
    }

    #[test]
    fn test_operation_stops_when_told() {
        let mut operation = RetryOperation::new(RetryPolicy::new().resolve());
        operation.attempt();
        assert_eq!(operation.retry(false), None);
    }

    #[test]
    fn test_predicates() {
        let timeout = {
            let mut e = TransportError::new(TransportErrorKind::Timeout, "timed out");
            e.timeout = true;
            Error::Transport(e)
        };
        let refused = Error::Transport(TransportError::new(TransportErrorKind::Connect, "refused"));

        assert!(RetryOnError.should_retry(Some(&refused), None));
        assert!(!RetryOnError.should_retry(None, Some(&response(500))));
        assert!(RetryOnTimeout.should_retry(Some(&timeout), None));
        assert!(!RetryOnTimeout.should_retry(Some(&refused), None));
        assert!(RetryOn5xx.should_retry(None, Some(&response(503))));
        assert!(!RetryOn5xx.should_retry(None, Some(&response(404))));
        assert!(RetryOnStatus(429).should_retry(None, Some(&response(429))));

        let either = OrPredicate::new(vec![Box::new(RetryOnError), Box::new(RetryOnStatus(429))]);
        assert!(either.should_retry(None, Some(&response(429))));
        assert!(either.should_retry(Some(&refused), None));
        assert!(!either.should_retry(None, Some(&response(200))));

        let both = AndPredicate::new(vec![
            Box::new(RetryOnError),
            Box::new(|e: Option<&Error>, _: Option<&Response>| e.is_some_and(Error::is_timeout)),
        ]);
        assert!(both.should_retry(Some(&timeout), None));
        assert!(!both.should_retry(Some(&refused), None));
    }
}
