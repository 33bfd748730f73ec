//! Cancellation for a logical request.
//!
//! The caller keeps an [`AbortController`] and hands its [`AbortSignal`] to
//! the request. Aborting records the reason once, wakes a pending backoff
//! wait and fires the abort function of the attempt in flight. An abort that
//! arrives before any attempt registered is replayed on registration.

use crate::dispatch::AbortFn;
use crate::error::RequestError;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct SignalState {
    reason: Option<RequestError>,
    attempt_abort: Option<AbortFn>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SignalState>,
    wake: Condvar,
}

/// Observer side of a cancellation. Cheap to clone.
#[derive(Clone, Default)]
pub struct AbortSignal {
    shared: Arc<Shared>,
}

/// Owner side of a cancellation.
#[derive(Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self, reason: RequestError) {
        self.signal.abort(reason);
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalState> {
        // State stays consistent across a panicking holder; keep going.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `reason` (first one wins) and cancel the attempt in flight.
    pub fn abort(&self, reason: RequestError) {
        let pending = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason.clone());
            state.attempt_abort.take()
        };
        self.shared.wake.notify_all();
        if let Some(abort) = pending {
            abort(reason);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().reason.is_some()
    }

    pub fn reason(&self) -> Option<RequestError> {
        self.lock().reason.clone()
    }

    /// Install the abort function of a new attempt. If the signal was already
    /// aborted the function is invoked right away with the stored reason.
    pub fn register(&self, abort: AbortFn) {
        let reason = {
            let mut state = self.lock();
            match state.reason.clone() {
                Some(reason) => reason,
                None => {
                    state.attempt_abort = Some(abort);
                    return;
                }
            }
        };
        abort(reason);
    }

    /// Drop the abort function of an attempt that has ended.
    pub fn clear(&self) {
        self.lock().attempt_abort = None;
    }

    /// Sleep for `delay` unless aborted first; returns the reason on abort.
    ///
    /// A delay too large to represent as a deadline waits until aborted.
    pub fn wait(&self, delay: Duration) -> Result<(), RequestError> {
        let deadline = Instant::now().checked_add(delay);
        let mut state = self.lock();
        loop {
            if let Some(reason) = &state.reason {
                return Err(reason.clone());
            }
            state = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(());
                    }
                    match self.shared.wake.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.shared.wake.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl fmt::Debug for AbortController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortController")
            .field("signal", &self.signal)
            .finish()
    }
}
