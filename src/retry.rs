//! Retry policy for handling transient failures.
//!
//! A [`RetryPolicy`] bounds how many times a request is attempted, how long
//! each attempt may take, how long to wait between attempts, and which HTTP
//! statuses count as transient.

use http::StatusCode;
use std::collections::HashSet;
use std::time::Duration;

/// Upper bound on any single exponential backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Statuses retried when the caller does not supply their own set.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Defines when and how to retry failed requests.
///
/// `max_attempts` counts every attempt including the first, so a policy with
/// `max_attempts = 3` fires at most three requests.
///
/// # Examples
///
/// ```
/// use rollcall::RetryPolicy;
/// use std::time::Duration;
///
/// // 3 attempts, 1s base delay doubling per attempt, 30s per-attempt timeout
/// let default = RetryPolicy::default();
/// assert_eq!(default.max_attempts(), 3);
///
/// // Fixed 500ms between attempts, only 503 retried
/// let fixed = RetryPolicy::default()
///     .with_exponential_backoff(false)
///     .with_retry_delay(Duration::from_millis(500))
///     .with_retryable_status_codes([503]);
/// assert_eq!(fixed.delay_for_attempt(4), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    retry_delay: Duration,
    retryable_status_codes: HashSet<u16>,
    exponential_backoff: bool,
    timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            exponential_backoff: true,
            timeout: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Policy used for authenticated JSON calls.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Policy used for multipart uploads: fewer attempts, longer waits.
    pub fn upload() -> Self {
        Self::default()
            .with_max_attempts(2)
            .with_retry_delay(Duration::from_millis(2000))
            .with_timeout(Duration::from_millis(60_000))
    }

    /// Single short attempt, used by the API health check.
    pub fn health_check() -> Self {
        Self::default()
            .with_max_attempts(1)
            .with_timeout(Duration::from_millis(5000))
    }

    /// Sets the total number of attempts. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Replaces the set of statuses treated as transient.
    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    /// Enables or disables doubling of the delay per attempt.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The total number of attempts, at least 1.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The base delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Whether the delay doubles per attempt.
    pub fn exponential_backoff(&self) -> bool {
        self.exponential_backoff
    }

    /// The per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The statuses treated as transient.
    pub fn retryable_status_codes(&self) -> &HashSet<u16> {
        &self.retryable_status_codes
    }

    /// Returns `true` if a response with this status should be attempted again.
    ///
    /// Successful statuses never are. Every other status, 4xx or 5xx, must be
    /// listed explicitly.
    pub fn retries_status(&self, status: StatusCode) -> bool {
        !status.is_success() && self.retryable_status_codes.contains(&status.as_u16())
    }

    /// Returns the wait after the given failed attempt (1-indexed).
    ///
    /// With exponential backoff the wait is `retry_delay * 2^(attempt - 1)`,
    /// capped at [`MAX_BACKOFF`]. Without it, the wait is always `retry_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if !self.exponential_backoff {
            return self.retry_delay;
        }

        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let multiplier = 2u32.saturating_pow(exponent);
        self.retry_delay.saturating_mul(multiplier).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        // wait before attempt 3
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for_attempt(6), MAX_BACKOFF);
        assert_eq!(policy.delay_for_attempt(60), MAX_BACKOFF);
    }

    #[test]
    fn test_backoff_cap_applies_to_large_base() {
        let policy = RetryPolicy::default().with_retry_delay(Duration::from_secs(10));

        // wait before attempt 5 would be 80s uncapped
        assert_eq!(policy.delay_for_attempt(4), MAX_BACKOFF);
    }

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::default()
            .with_exponential_backoff(false)
            .with_retry_delay(Duration::from_secs(45));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(45));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(45));
    }

    #[test]
    fn test_status_eligibility() {
        let policy = RetryPolicy::default();

        assert!(policy.retries_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.retries_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.retries_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!policy.retries_status(StatusCode::NOT_FOUND));
        assert!(!policy.retries_status(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(!policy.retries_status(StatusCode::NOT_IMPLEMENTED));
        assert!(!policy.retries_status(StatusCode::OK));

        let custom = policy.with_retryable_status_codes([409]);
        assert!(custom.retries_status(StatusCode::CONFLICT));
        assert!(!custom.retries_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_attempts_never_below_one() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::upload().max_attempts(), 2);
        assert_eq!(RetryPolicy::health_check().timeout(), Duration::from_secs(5));
    }
}
