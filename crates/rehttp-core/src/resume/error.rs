//! Identity violations between attempts.

use thiserror::Error;

/// Why a response cannot continue an interrupted body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeError {
    /// The first response was not resumable, so no continuation is possible.
    #[error("response body is not resumable")]
    NotResumable,
    /// Continuation must be 206, or 200 when nothing was delivered yet.
    #[error("server does not support range requests (HTTP {status}) and the body was partially consumed")]
    NotPartialContent { status: u16 },
    #[error("missing or malformed Content-Range on resumed response")]
    MissingContentRange,
    #[error("entity tag changed: expected {expected}, got {actual:?}")]
    ValidatorMismatch {
        expected: String,
        actual: Option<String>,
    },
    #[error("resumed range starts at {actual}, expected {expected}")]
    RangeStartMismatch { expected: u64, actual: u64 },
    #[error("resumed range ends at {actual:?}, expected {expected}")]
    RangeEndMismatch { expected: u64, actual: Option<u64> },
}
