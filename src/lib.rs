//! Turnstile - request rate limiting for search endpoints
//!
//! This crate bounds request volume per client with a sliding-window counter.
//! Policies are registered by name at startup, window state lives in a
//! sharded in-memory store with idle eviction, and guards attach a policy to
//! any operation without depending on a web framework.

pub mod config;
pub mod error;
pub mod guard;
pub mod ratelimit;

pub use error::{RateLimitExceeded, Result, StoreError, TurnstileError};
