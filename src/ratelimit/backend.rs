//! Counter store trait for abstracting the window state backend.

use std::time::Instant;

use async_trait::async_trait;

use super::key::WindowKey;
use super::policy::LimiterPolicy;
use super::store::{WindowDecision, WindowStore};
use crate::error::StoreError;

/// Trait for window state backends.
///
/// Implementations must apply roll, decision and increment for one key as a
/// single atomic step. The in-memory [`WindowStore`] completes without
/// suspending and never fails; a remote backend would use its own atomic primitives and
/// enforce its own timeout.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count a request for `key` under `policy` at `now` if it fits the quota.
    async fn increment_and_check(
        &self,
        key: &WindowKey,
        policy: &LimiterPolicy,
        now: Instant,
    ) -> Result<WindowDecision, StoreError>;
}

#[async_trait]
impl CounterStore for WindowStore {
    async fn increment_and_check(
        &self,
        key: &WindowKey,
        policy: &LimiterPolicy,
        now: Instant,
    ) -> Result<WindowDecision, StoreError> {
        Ok(WindowStore::increment_and_check(self, key, policy, now))
    }
}
