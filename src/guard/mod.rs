//! Framework-agnostic admission guards.
//!
//! A [`Guard`] sits in front of any request-handling operation. It derives an
//! identifier from the request through an [`IdentifierExtractor`], asks the
//! [`RateLimiter`](crate::ratelimit::RateLimiter) for admission and either
//! runs the operation or returns [`RateLimitExceeded`](crate::error::RateLimitExceeded).

mod extract;
mod middleware;

pub use extract::{
    GlobalIdentifier, IdentifierExtractor, IpIdentifier, PeerAddr, ANONYMOUS_IDENTIFIER,
    GLOBAL_IDENTIFIER,
};
pub use middleware::{Admitted, Guard, Guarded};
