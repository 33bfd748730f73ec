use super::error::ResumeError;
use crate::error::RequestError;
use crate::etag::strong_validator;
use crate::headers::HeaderMap;
use crate::range::{parse_content_length, range_header_value, ContentRange};

/// What to do with a response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// First response of the logical request: forward it downstream.
    /// `resumable` tells whether a later failure can be continued.
    Forward { resumable: bool },
    /// Continuation of a body already streaming; headers stay internal.
    Resumed,
}

/// Position, end and identity of the body of one logical request.
#[derive(Debug, Default)]
pub struct ResumeTracker {
    /// Absolute offset of the next byte to deliver.
    position: u64,
    /// Exclusive end offset of the resource, fixed once known.
    range_end: Option<u64>,
    /// Strong entity tag of the first response.
    validator: Option<String>,
    headers_forwarded: bool,
    resumable: bool,
    pending_failure: Option<RequestError>,
}

impl ResumeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn range_end(&self) -> Option<u64> {
        self.range_end
    }

    pub fn validator(&self) -> Option<&str> {
        self.validator.as_deref()
    }

    pub fn headers_forwarded(&self) -> bool {
        self.headers_forwarded
    }

    pub fn is_resumable(&self) -> bool {
        self.resumable
    }

    /// False once headers went downstream for a body that cannot be resumed.
    pub fn can_retry(&self) -> bool {
        !self.headers_forwarded || self.resumable
    }

    pub fn pending_failure(&self) -> Option<&RequestError> {
        self.pending_failure.as_ref()
    }

    pub fn set_pending_failure(&mut self, err: RequestError) {
        self.pending_failure = Some(err);
    }

    pub fn take_pending_failure(&mut self) -> Option<RequestError> {
        self.pending_failure.take()
    }

    /// Classify a response head. On `Err` the pending failure is left in
    /// place so the caller can surface it.
    pub fn on_response(
        &mut self,
        status: u16,
        headers: &HeaderMap,
    ) -> Result<ResponseDisposition, ResumeError> {
        if self.headers_forwarded {
            if !self.resumable {
                return Err(ResumeError::NotResumable);
            }
            self.accept_continuation(status, headers)?;
            self.pending_failure = None;
            return Ok(ResponseDisposition::Resumed);
        }

        self.pending_failure = None;
        self.headers_forwarded = true;
        self.resumable = self.capture(status, headers);
        Ok(ResponseDisposition::Forward {
            resumable: self.resumable,
        })
    }

    /// Account for a body chunk about to be delivered.
    pub fn advance(&mut self, len: usize) {
        self.position = self.position.saturating_add(len as u64);
    }

    /// `Range` header for the next attempt, when part of the body was
    /// already delivered.
    pub fn range_header(&self) -> Option<String> {
        (self.resumable && self.position > 0)
            .then(|| range_header_value(self.position, self.range_end))
    }

    /// Record position, end and validator of the first response. Returns
    /// whether the body can be resumed later.
    fn capture(&mut self, status: u16, headers: &HeaderMap) -> bool {
        // A body followed by trailers cannot be spliced from two responses.
        if headers.contains("trailer") {
            return false;
        }
        let content_length = match headers.get("content-length") {
            Some(v) => match parse_content_length(v) {
                Some(n) => Some(n),
                None => return false,
            },
            None => None,
        };
        let (start, end) = match status {
            206 => match headers.get("content-range").and_then(ContentRange::parse) {
                Some(r) => (r.start, Some(r.end())),
                None => return false,
            },
            200 => (0, content_length),
            _ => return false,
        };
        self.position = start;
        self.range_end = end;
        self.validator = strong_validator(headers);
        true
    }

    fn accept_continuation(&mut self, status: u16, headers: &HeaderMap) -> Result<(), ResumeError> {
        if !(status == 206 || (status == 200 && self.position == 0)) {
            return Err(ResumeError::NotPartialContent { status });
        }

        if let Some(expected) = &self.validator {
            let actual = strong_validator(headers);
            if actual.as_deref() != Some(expected.as_str()) {
                return Err(ResumeError::ValidatorMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let (start, end) = if status == 206 {
            let r = headers
                .get("content-range")
                .and_then(ContentRange::parse)
                .ok_or(ResumeError::MissingContentRange)?;
            (r.start, Some(r.end()))
        } else {
            (0, headers.get("content-length").and_then(parse_content_length))
        };

        if start != self.position {
            return Err(ResumeError::RangeStartMismatch {
                expected: self.position,
                actual: start,
            });
        }
        match self.range_end {
            Some(expected) if end != Some(expected) => {
                return Err(ResumeError::RangeEndMismatch {
                    expected,
                    actual: end,
                });
            }
            Some(_) => {}
            None => self.range_end = end,
        }
        Ok(())
    }
}
