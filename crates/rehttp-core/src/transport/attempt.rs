//! Per-attempt state shared by the libcurl callbacks.

use crate::dispatch::Handler;
use crate::error::{RequestError, TransportErrorKind};
use crate::headers::{parse_status_line, HeaderMap};

/// Turns raw libcurl header/body callbacks into handler events.
///
/// Header lines are buffered until the blank line ending a final (non-1xx)
/// block; header lines after that are trailers.
pub(super) struct Attempt<'h, H: ?Sized> {
    handler: &'h mut H,
    status: Option<u16>,
    head: HeaderMap,
    trailers: HeaderMap,
    headers_delivered: bool,
    /// Handler returned false from `on_headers`.
    rejected: bool,
}

impl<'h, H: Handler + ?Sized> Attempt<'h, H> {
    pub(super) fn new(handler: &'h mut H) -> Self {
        Self {
            handler,
            status: None,
            head: HeaderMap::new(),
            trailers: HeaderMap::new(),
            headers_delivered: false,
            rejected: false,
        }
    }

    /// One raw header line from libcurl. Returning false stops the transfer.
    pub(super) fn on_header_line(&mut self, raw: &[u8]) -> bool {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        if self.headers_delivered {
            self.trailers.push_line(line);
            return true;
        }
        if let Some(code) = parse_status_line(line) {
            self.status = Some(code);
            self.head = HeaderMap::new();
            return true;
        }
        if !line.is_empty() {
            self.head.push_line(line);
            return true;
        }

        match self.status {
            // Interim response; the final one follows.
            Some(code) if (100..200).contains(&code) => {
                self.status = None;
                self.head = HeaderMap::new();
                true
            }
            Some(code) => {
                self.headers_delivered = true;
                if self.handler.on_headers(code, &self.head) {
                    true
                } else {
                    self.rejected = true;
                    false
                }
            }
            None => true,
        }
    }

    /// One body chunk. Returning false stops the transfer.
    pub(super) fn on_body(&mut self, data: &[u8]) -> bool {
        if !self.headers_delivered {
            return false;
        }
        if !self.handler.on_data(data) {
            // Callbacks block libcurl already, so there is nothing to pause.
            tracing::trace!(len = data.len(), "consumer signalled backpressure");
        }
        true
    }

    /// Deliver the single terminal event for this attempt.
    pub(super) fn finish(self, result: Result<(), curl::Error>, aborted: Option<RequestError>) {
        match result {
            Ok(()) if self.headers_delivered => self.handler.on_complete(&self.trailers),
            Ok(()) => self.handler.on_error(RequestError::transport(
                TransportErrorKind::ConnectionReset,
                "connection closed before a response head",
            )),
            Err(e) => {
                let err = match aborted {
                    Some(reason) => reason,
                    None if self.rejected => RequestError::transport(
                        TransportErrorKind::Other,
                        "response rejected by handler",
                    ),
                    None => RequestError::from(&e),
                };
                tracing::debug!(error = %err, curl_code = e.code(), "attempt failed");
                self.handler.on_error(err);
            }
        }
    }
}
