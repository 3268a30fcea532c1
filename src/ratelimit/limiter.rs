//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use super::backend::CounterStore;
use super::key::WindowKey;
use super::policy::LimiterPolicy;
use super::store::WindowStore;
use crate::error::StoreError;

/// What the limiter does when its store cannot answer.
///
/// Failing open keeps traffic flowing but silently drops protection; failing
/// closed keeps protection but can turn a store fault into an outage. Neither
/// is applied implicitly: the mode is part of the limiter's configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Deny requests while the store is failing
    #[default]
    Closed,
    /// Admit requests while the store is failing
    Open,
}

/// Admission decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request was admitted and counted
    Allowed {
        /// Requests left in the rolling window
        remaining: u64,
    },
    /// The request was rejected and not counted
    Denied {
        /// Time until the current window closes
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// The core rate limiter applying the sliding-window counter to a store.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Window state backend
    store: Arc<dyn CounterStore>,
    /// Behaviour when the backend fails
    failure_mode: FailureMode,
}

impl RateLimiter {
    /// Create a new rate limiter over `store`.
    pub fn new(store: Arc<dyn CounterStore>, failure_mode: FailureMode) -> Self {
        Self {
            store,
            failure_mode,
        }
    }

    /// The configured failure mode.
    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Check and count a request from `identifier` under `policy` now.
    pub async fn check(&self, policy: &LimiterPolicy, identifier: &str) -> Admission {
        self.check_at(policy, identifier, Instant::now()).await
    }

    /// Check and count a request from `identifier` under `policy` at `now`.
    pub async fn check_at(&self, policy: &LimiterPolicy, identifier: &str, now: Instant) -> Admission {
        let key = WindowKey::new(policy.name(), identifier);

        trace!(
            key = %key,
            limit = policy.max_requests(),
            "Checking rate limit"
        );

        match self.store.increment_and_check(&key, policy, now).await {
            Ok(decision) if decision.allowed => Admission::Allowed {
                remaining: decision.remaining(policy.max_requests()),
            },
            Ok(decision) => {
                debug!(
                    key = %key,
                    effective = decision.effective,
                    limit = policy.max_requests(),
                    retry_after = ?decision.retry_after,
                    "Rate limit exceeded"
                );
                Admission::Denied {
                    retry_after: decision.retry_after,
                }
            }
            Err(err) => self.store_failed(&key, policy, err),
        }
    }

    fn store_failed(&self, key: &WindowKey, policy: &LimiterPolicy, err: StoreError) -> Admission {
        match self.failure_mode {
            FailureMode::Closed => {
                error!(
                    key = %key,
                    error = %err,
                    "Window store failed, denying request (fail closed)"
                );
                Admission::Denied {
                    retry_after: policy.window(),
                }
            }
            FailureMode::Open => {
                warn!(
                    key = %key,
                    error = %err,
                    "Window store failed, admitting request unchecked (fail open)"
                );
                Admission::Allowed { remaining: 0 }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(WindowStore::default()), FailureMode::default())
    }
}
