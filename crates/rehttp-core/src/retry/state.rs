//! Attempt counters for one logical request.

/// Counts failed physical attempts.
///
/// A response head bumps the counter, so an attempt that first got headers and
/// then failed is not counted a second time when its error arrives. An attempt
/// that fails before any response is counted when the error arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts counted so far.
    pub attempt_count: u32,
    /// Value of `attempt_count` when the current attempt was dispatched.
    pub attempt_checkpoint: u32,
}

impl RetryState {
    /// A response head arrived for the current attempt.
    pub fn note_response(&mut self) {
        if self.attempt_count == self.attempt_checkpoint {
            self.attempt_count = self.attempt_count.saturating_add(1);
        }
    }

    /// The current attempt failed; returns the attempt number to hand to the
    /// retry policy.
    pub fn note_failure(&mut self) -> u32 {
        if self.attempt_count == self.attempt_checkpoint {
            self.attempt_count = self.attempt_count.saturating_add(1);
        }
        self.attempt_count
    }

    /// A new attempt is being dispatched.
    pub fn checkpoint(&mut self) {
        self.attempt_checkpoint = self.attempt_count;
    }
}
