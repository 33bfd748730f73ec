//! Retry handler: wraps a consumer handler, re-issues failed attempts and
//! resumes partially received bodies with byte-range requests.
//!
//! The consumer observes a single logical response: headers once, body bytes
//! in order without gaps or duplicates, then exactly one `on_complete` or
//! `on_error`. Attempts are dispatched one at a time; between attempts the
//! handler waits for the backoff delay on the request's abort signal.

use crate::dispatch::{AbortFn, Dispatch, DispatchOptions, Handler};
use crate::error::{RequestError, TransportErrorKind};
use crate::headers::HeaderMap;
use crate::resume::{ResponseDisposition, ResumeTracker};
use crate::retry::{RetryConfiguration, RetryDecision, RetryState};
use crate::signal::AbortSignal;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Attempt dispatched, no response head accepted yet.
    AwaitingResponse,
    /// Body flowing to the consumer.
    Streaming,
    /// Attempt failed; the next one starts after the backoff delay.
    AwaitingRetry,
    /// Outcome delivered to the consumer.
    Terminal,
}

/// Decorator implementing the handler protocol on behalf of `downstream`.
pub struct RetryHandler<'a, H: ?Sized> {
    downstream: &'a mut H,
    config: &'a RetryConfiguration,
    /// Caller's options; each attempt gets a derived clone.
    opts: DispatchOptions,
    signal: AbortSignal,
    tracker: ResumeTracker,
    state: RetryState,
    phase: Phase,
    /// Retryable status seen in `on_headers`, raised when the attempt ends.
    deferred: Option<RequestError>,
    next_delay: Option<Duration>,
    connected: bool,
}

impl<'a, H: Handler + ?Sized> RetryHandler<'a, H> {
    pub fn new(opts: DispatchOptions, config: &'a RetryConfiguration, downstream: &'a mut H) -> Self {
        let signal = opts.signal.clone().unwrap_or_default();
        Self {
            downstream,
            config,
            opts,
            signal,
            tracker: ResumeTracker::new(),
            state: RetryState::default(),
            phase: Phase::AwaitingResponse,
            deferred: None,
            next_delay: None,
            connected: false,
        }
    }

    /// Attempts counted so far.
    pub fn attempts(&self) -> u32 {
        self.state.attempt_count
    }

    /// Drive attempts through `dispatcher` until the consumer got its
    /// terminal callback.
    pub fn run<D: Dispatch + ?Sized>(mut self, dispatcher: &D) {
        loop {
            let attempt_opts = self.attempt_options();
            self.phase = Phase::AwaitingResponse;
            self.state.checkpoint();
            tracing::debug!(
                method = %attempt_opts.method,
                url = %attempt_opts.url,
                range = attempt_opts.headers.get("range").unwrap_or("-"),
                "dispatching attempt"
            );
            dispatcher.dispatch(attempt_opts, &mut self);
            self.signal.clear();

            if matches!(self.phase, Phase::AwaitingResponse | Phase::Streaming) {
                let err = self.deferred.take().unwrap_or_else(|| {
                    RequestError::transport(
                        TransportErrorKind::Other,
                        "attempt ended without a terminal callback",
                    )
                });
                self.handle_failure(err);
            }

            match self.phase {
                Phase::AwaitingRetry => {
                    let delay = self.next_delay.take().unwrap_or_default();
                    if let Err(reason) = self.signal.wait(delay) {
                        tracing::debug!("cancelled during backoff");
                        self.finish_error(reason);
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    /// Options for the next attempt: the caller's options plus, when part of
    /// the body was delivered, a range continuing at the current position.
    fn attempt_options(&self) -> DispatchOptions {
        let mut opts = self.opts.clone();
        if let Some(range) = self.tracker.range_header() {
            opts.headers.insert("Range", range);
            if let Some(validator) = self.tracker.validator() {
                opts.headers.insert("If-Match", validator);
            }
        }
        opts
    }

    fn handle_failure(&mut self, err: RequestError) {
        if self.signal.is_aborted() {
            self.finish_error(err);
            return;
        }
        if self.opts.body.is_disturbed() {
            tracing::debug!("request body already streamed, not retrying");
            self.finish_error(err);
            return;
        }
        if !self.tracker.can_retry() {
            tracing::debug!("response body is not resumable, not retrying");
            self.finish_error(err);
            return;
        }

        let attempt = self.state.note_failure();
        // The cap holds for every policy, not just the built-in one.
        if attempt > self.config.max_retries {
            tracing::debug!(attempt, max_retries = self.config.max_retries, "retries exhausted");
            self.finish_error(err);
            return;
        }
        match self.config.decide(&err, attempt, self.opts.method) {
            RetryDecision::Fail(err) => {
                tracing::debug!(attempt, error = %err, "giving up");
                self.finish_error(err);
            }
            RetryDecision::Retry(delay) => {
                tracing::info!(
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    position = self.tracker.position(),
                    error = %err,
                    "retrying request"
                );
                self.tracker.set_pending_failure(err);
                self.next_delay = Some(delay);
                self.phase = Phase::AwaitingRetry;
            }
        }
    }

    fn finish_error(&mut self, err: RequestError) {
        self.phase = Phase::Terminal;
        self.deferred = None;
        self.tracker.take_pending_failure();
        self.downstream.on_error(err);
    }
}

impl<H: Handler + ?Sized> Handler for RetryHandler<'_, H> {
    fn on_connect(&mut self, abort: AbortFn) {
        if self.phase == Phase::Terminal {
            abort(RequestError::aborted("request already finished"));
            return;
        }
        if !self.connected {
            self.connected = true;
            let signal = self.signal.clone();
            self.downstream
                .on_connect(Box::new(move |reason| signal.abort(reason)));
        }
        // Fires immediately when the request was cancelled before this attempt.
        self.signal.register(abort);
    }

    fn on_headers(&mut self, status: u16, headers: &HeaderMap) -> bool {
        if self.phase != Phase::AwaitingResponse {
            return false;
        }
        self.state.note_response();

        if status >= 300 && self.config.is_retryable_status(status) {
            self.deferred = Some(RequestError::Status {
                status,
                headers: headers.clone(),
            });
            return false;
        }

        match self.tracker.on_response(status, headers) {
            Ok(ResponseDisposition::Forward { resumable }) => {
                tracing::debug!(status, resumable, "forwarding response headers");
                self.phase = Phase::Streaming;
                if self.downstream.on_headers(status, headers) {
                    true
                } else {
                    self.signal
                        .abort(RequestError::aborted("consumer stopped the response"));
                    false
                }
            }
            Ok(ResponseDisposition::Resumed) => {
                tracing::info!(status, position = self.tracker.position(), "resuming body");
                self.phase = Phase::Streaming;
                true
            }
            Err(violation) => {
                tracing::warn!(status, %violation, "resumed response does not continue the body");
                let original = self.tracker.take_pending_failure().unwrap_or_else(|| {
                    RequestError::transport(TransportErrorKind::Other, violation.to_string())
                });
                self.finish_error(original);
                false
            }
        }
    }

    fn on_data(&mut self, chunk: &[u8]) -> bool {
        if self.phase != Phase::Streaming {
            return false;
        }
        self.tracker.advance(chunk.len());
        self.downstream.on_data(chunk)
    }

    fn on_complete(&mut self, trailers: &HeaderMap) {
        self.signal.clear();
        match self.phase {
            Phase::Terminal | Phase::AwaitingRetry => {}
            Phase::AwaitingResponse => {
                let err = self.deferred.take().unwrap_or_else(|| {
                    RequestError::transport(
                        TransportErrorKind::Other,
                        "attempt completed without a response",
                    )
                });
                self.handle_failure(err);
            }
            Phase::Streaming => {
                self.phase = Phase::Terminal;
                self.downstream.on_complete(trailers);
            }
        }
    }

    fn on_error(&mut self, err: RequestError) {
        self.signal.clear();
        if matches!(self.phase, Phase::Terminal | Phase::AwaitingRetry) {
            return;
        }
        let err = match self.deferred.take() {
            Some(status_err) if !self.signal.is_aborted() => status_err,
            _ => err,
        };
        self.handle_failure(err);
    }
}

/// Dispatcher decorator that runs every request through a [`RetryHandler`].
#[derive(Debug)]
pub struct RetryAgent<D> {
    inner: D,
    config: RetryConfiguration,
}

impl<D: Dispatch> RetryAgent<D> {
    pub fn new(inner: D, config: RetryConfiguration) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfiguration {
        &self.config
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

impl<D: Dispatch> Dispatch for RetryAgent<D> {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler) {
        RetryHandler::new(opts, &self.config, handler).run(&self.inner);
    }
}

#[cfg(test)]
mod tests;
