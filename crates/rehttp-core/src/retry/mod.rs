//! Retry and backoff policy.
//!
//! This module holds the retry decision (error kind, method and status
//! filtering, attempt cap), backoff computation and the per-request attempt
//! counters, so the retry handler only has to schedule what the policy says.

mod backoff;
mod policy;
mod state;

pub use backoff::{backoff_delay, parse_retry_after};
pub use policy::{
    DefaultRetryPolicy, RetryConfiguration, RetryContext, RetryDecision, RetryPolicy,
    DEFAULT_RETRYABLE_ERROR_CODES, DEFAULT_RETRYABLE_METHODS, DEFAULT_RETRYABLE_STATUS_CODES,
};
pub use state::RetryState;
