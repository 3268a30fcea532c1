//! Error types for the Turnstile limiter.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Every variant here is a startup-time failure: configuration that cannot be
/// loaded or a policy catalogue that cannot be built. None of them is expected
/// while serving traffic.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A guard or lookup referenced a policy that was never registered
    #[error("Unknown rate limit policy `{0}`")]
    UnknownPolicy(String),

    /// Two policies were registered under the same name
    #[error("Rate limit policy `{0}` is already registered")]
    DuplicatePolicy(String),

    /// A policy violates `window > 0 && max_requests > 0` or has no name
    #[error("Invalid rate limit policy `{name}`: {reason}")]
    InvalidPolicy {
        /// Name of the offending policy
        name: String,
        /// What was wrong with it
        reason: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for TurnstileError {
    fn from(err: ::config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// Failure of the counter store backing a limiter.
///
/// These never reach guard callers directly; the limiter's
/// [`FailureMode`](crate::ratelimit::FailureMode) turns them into an
/// allow or a deny.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or returned unusable state
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Rejection signal returned by a guard when a client is over its quota.
///
/// This is normal operation under load, not an application error. The
/// transport layer maps it onto its own framing, e.g. HTTP 429 with a
/// `Retry-After` header taken from [`retry_after_secs`](Self::retry_after_secs).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded for `{identifier}` under policy `{policy}`, retry after {}s", ceil_secs(.retry_after))]
pub struct RateLimitExceeded {
    /// Policy whose quota was exhausted
    pub policy: String,
    /// Identifier that was throttled
    pub identifier: String,
    /// Time until the current window closes
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Retry-after rounded up to whole seconds, never less than one.
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(&self.retry_after)
    }
}

fn ceil_secs(duration: &Duration) -> u64 {
    let secs = duration.as_secs();
    let secs = if duration.subsec_nanos() > 0 { secs + 1 } else { secs };
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exceeded(retry_after: Duration) -> RateLimitExceeded {
        RateLimitExceeded {
            policy: "search".to_string(),
            identifier: "10.0.0.1".to_string(),
            retry_after,
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(exceeded(Duration::from_millis(1500)).retry_after_secs(), 2);
        assert_eq!(exceeded(Duration::from_secs(42)).retry_after_secs(), 42);
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        assert_eq!(exceeded(Duration::ZERO).retry_after_secs(), 1);
        assert_eq!(exceeded(Duration::from_millis(10)).retry_after_secs(), 1);
    }

    #[test]
    fn test_rate_limit_exceeded_display() {
        let err = exceeded(Duration::from_secs(30));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded for `10.0.0.1` under policy `search`, retry after 30s"
        );
    }
}
