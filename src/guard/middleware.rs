//! Admission guard around arbitrary operations.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::extract::{IdentifierExtractor, ANONYMOUS_IDENTIFIER};
use crate::error::{RateLimitExceeded, Result};
use crate::ratelimit::{Admission, LimiterPolicy, PolicyRegistry, RateLimiter};

/// Proof that a request passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// Identifier the request was counted under
    pub identifier: String,
    /// Requests left in the rolling window
    pub remaining: u64,
}

/// Admission gate binding one policy, one limiter and one extraction strategy.
///
/// The policy is resolved when the guard is built, so a misspelt policy name
/// fails at startup rather than on the first request. Quota is consumed when a
/// request is admitted and is never refunded, whatever the wrapped operation
/// does afterwards.
pub struct Guard<X> {
    policy: Arc<LimiterPolicy>,
    limiter: Arc<RateLimiter>,
    extractor: X,
}

impl<X: Clone> Clone for Guard<X> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            limiter: self.limiter.clone(),
            extractor: self.extractor.clone(),
        }
    }
}

impl<X> Guard<X> {
    /// Create a guard for the named policy.
    pub fn new(
        registry: &PolicyRegistry,
        limiter: Arc<RateLimiter>,
        policy_name: &str,
        extractor: X,
    ) -> Result<Self> {
        let policy = registry.resolve(policy_name)?;
        Ok(Self {
            policy,
            limiter,
            extractor,
        })
    }

    /// The policy this guard enforces.
    pub fn policy(&self) -> &LimiterPolicy {
        &self.policy
    }

    /// Check and count the request described by `ctx`.
    pub async fn admit<C>(&self, ctx: &C) -> std::result::Result<Admitted, RateLimitExceeded>
    where
        C: ?Sized,
        X: IdentifierExtractor<C>,
    {
        let mut identifier = self.extractor.extract(ctx);
        if identifier.is_empty() {
            debug!(
                policy = self.policy.name(),
                "Extractor produced no identifier, counting as anonymous"
            );
            identifier = ANONYMOUS_IDENTIFIER.to_string();
        }

        match self.limiter.check(&self.policy, &identifier).await {
            Admission::Allowed { remaining } => Ok(Admitted {
                identifier,
                remaining,
            }),
            Admission::Denied { retry_after } => {
                debug!(
                    policy = self.policy.name(),
                    identifier = %identifier,
                    retry_after = ?retry_after,
                    "Request throttled"
                );
                Err(RateLimitExceeded {
                    policy: self.policy.name().to_string(),
                    identifier,
                    retry_after,
                })
            }
        }
    }

    /// Run `op` if the request described by `ctx` is admitted.
    ///
    /// On denial `op` is never invoked. On admission its output is returned
    /// untouched.
    pub async fn run<C, F, Fut>(&self, ctx: &C, op: F) -> std::result::Result<Fut::Output, RateLimitExceeded>
    where
        C: ?Sized,
        X: IdentifierExtractor<C>,
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        self.admit(ctx).await?;
        Ok(op().await)
    }

    /// Wrap `handler` so every call passes through this guard first.
    pub fn wrap<H>(self, handler: H) -> Guarded<X, H> {
        Guarded {
            guard: self,
            handler,
        }
    }
}

/// A handler wrapped by a [`Guard`].
///
/// `Guarded` turns an operation `C -> T` into `C -> Result<T, RateLimitExceeded>`
/// without knowing anything about the framework that calls it.
pub struct Guarded<X, H> {
    guard: Guard<X>,
    handler: H,
}

impl<X: Clone, H: Clone> Clone for Guarded<X, H> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<X, H> Guarded<X, H> {
    /// Admit `ctx`, then hand it to the wrapped handler.
    pub async fn call<C, Fut>(&self, ctx: C) -> std::result::Result<Fut::Output, RateLimitExceeded>
    where
        X: IdentifierExtractor<C>,
        H: Fn(C) -> Fut,
        Fut: Future,
    {
        self.guard.admit(&ctx).await?;
        Ok((self.handler)(ctx).await)
    }

    /// The guard in front of the handler.
    pub fn guard(&self) -> &Guard<X> {
        &self.guard
    }
}
