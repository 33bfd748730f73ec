use super::backoff::{backoff_delay, parse_retry_after};
use crate::dispatch::Method;
use crate::error::{RequestError, TransportErrorKind};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decision returned by a retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Issue another attempt after the given delay.
    Retry(Duration),
    /// Give up and deliver this error to the consumer.
    Fail(RequestError),
}

/// What a policy gets to look at besides the error.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// Failed attempts so far for this logical request, 1-based.
    pub attempt: u32,
    pub method: Method,
    pub config: &'a RetryConfiguration,
}

/// Pluggable retry decision.
///
/// Must not panic. Waiting for the returned delay is the caller's job.
pub trait RetryPolicy: Send + Sync {
    fn decide(&self, err: &RequestError, ctx: &RetryContext<'_>) -> RetryDecision;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RequestError, &RetryContext<'_>) -> RetryDecision + Send + Sync,
{
    fn decide(&self, err: &RequestError, ctx: &RetryContext<'_>) -> RetryDecision {
        self(err, ctx)
    }
}

/// Built-in policy: filter on error kind, method and status, cap the number
/// of retries, then wait per `Retry-After` or exponential backoff.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRetryPolicy;

impl DefaultRetryPolicy {
    /// Same as [`RetryPolicy::decide`] with an explicit clock.
    pub fn decide_at(
        &self,
        err: &RequestError,
        ctx: &RetryContext<'_>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        let cfg = ctx.config;

        // Cancellation and malformed requests never heal by retrying.
        if matches!(
            err,
            RequestError::Aborted { .. } | RequestError::InvalidRequest(_)
        ) {
            return RetryDecision::Fail(err.clone());
        }
        if let Some(kind) = err.transport_kind() {
            if !cfg.retryable_error_codes.contains(&kind) {
                return RetryDecision::Fail(err.clone());
            }
        }
        if !cfg.retryable_methods.contains(&ctx.method) {
            return RetryDecision::Fail(err.clone());
        }
        if let Some(status) = err.status() {
            if !cfg.retryable_status_codes.contains(&status) {
                return RetryDecision::Fail(err.clone());
            }
        }
        if ctx.attempt > cfg.max_retries {
            return RetryDecision::Fail(err.clone());
        }

        let hinted = if cfg.use_retry_after_header {
            err.headers()
                .and_then(|h| h.get("retry-after"))
                .and_then(|v| parse_retry_after(v, now))
        } else {
            None
        };
        let delay = match hinted {
            Some(d) => d.min(cfg.max_timeout),
            None => backoff_delay(
                ctx.attempt,
                cfg.min_timeout,
                cfg.max_timeout,
                cfg.timeout_factor,
            ),
        };
        RetryDecision::Retry(delay)
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn decide(&self, err: &RequestError, ctx: &RetryContext<'_>) -> RetryDecision {
        self.decide_at(err, ctx, Utc::now())
    }
}

/// Retry settings for one logical request.
#[derive(Clone)]
pub struct RetryConfiguration {
    /// Retries after the first attempt; total attempts never exceed this + 1.
    pub max_retries: u32,
    pub min_timeout: Duration,
    pub max_timeout: Duration,
    pub timeout_factor: f64,
    pub retryable_methods: Vec<Method>,
    pub retryable_status_codes: Vec<u16>,
    pub retryable_error_codes: Vec<TransportErrorKind>,
    /// Let a server `Retry-After` hint replace the computed backoff.
    pub use_retry_after_header: bool,
    pub policy: Arc<dyn RetryPolicy>,
}

pub const DEFAULT_RETRYABLE_METHODS: [Method; 6] = [
    Method::Get,
    Method::Head,
    Method::Options,
    Method::Put,
    Method::Delete,
    Method::Trace,
];

pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [429, 500, 502, 503, 504];

pub const DEFAULT_RETRYABLE_ERROR_CODES: [TransportErrorKind; 9] = [
    TransportErrorKind::ConnectionReset,
    TransportErrorKind::ConnectionRefused,
    TransportErrorKind::HostNotFound,
    TransportErrorKind::NetworkDown,
    TransportErrorKind::NetworkUnreachable,
    TransportErrorKind::HostDown,
    TransportErrorKind::HostUnreachable,
    TransportErrorKind::BrokenPipe,
    TransportErrorKind::Socket,
];

impl Default for RetryConfiguration {
    fn default() -> Self {
        Self {
            max_retries: 5,
            min_timeout: Duration::from_millis(500),
            max_timeout: Duration::from_secs(30),
            timeout_factor: 2.0,
            retryable_methods: DEFAULT_RETRYABLE_METHODS.to_vec(),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            retryable_error_codes: DEFAULT_RETRYABLE_ERROR_CODES.to_vec(),
            use_retry_after_header: true,
            policy: Arc::new(DefaultRetryPolicy),
        }
    }
}

impl RetryConfiguration {
    pub fn with_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Run the configured policy.
    pub fn decide(&self, err: &RequestError, attempt: u32, method: Method) -> RetryDecision {
        let ctx = RetryContext {
            attempt,
            method,
            config: self,
        };
        self.policy.decide(err, &ctx)
    }
}

impl fmt::Debug for RetryConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfiguration")
            .field("max_retries", &self.max_retries)
            .field("min_timeout", &self.min_timeout)
            .field("max_timeout", &self.max_timeout)
            .field("timeout_factor", &self.timeout_factor)
            .field("retryable_methods", &self.retryable_methods)
            .field("retryable_status_codes", &self.retryable_status_codes)
            .field("retryable_error_codes", &self.retryable_error_codes)
            .field("use_retry_after_header", &self.use_retry_after_header)
            .finish_non_exhaustive()
    }
}
