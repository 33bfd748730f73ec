//! Request error taxonomy shared by transports, the retry policy and consumers.

use crate::headers::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identifier for a transport-level failure.
///
/// Transports map their native errors (libcurl codes, `std::io::ErrorKind`)
/// into these kinds so the retry policy can filter on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportErrorKind {
    /// Peer reset or closed the connection mid-exchange.
    ConnectionReset,
    /// Nothing listening on the remote port.
    ConnectionRefused,
    /// DNS lookup failed.
    HostNotFound,
    NetworkDown,
    NetworkUnreachable,
    HostDown,
    HostUnreachable,
    /// Write to a closed connection.
    BrokenPipe,
    /// Generic socket failure reported by the transport.
    Socket,
    /// Connect or read timed out.
    Timeout,
    /// Anything else (TLS, protocol, local setup).
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionReset => "connection-reset",
            TransportErrorKind::ConnectionRefused => "connection-refused",
            TransportErrorKind::HostNotFound => "host-not-found",
            TransportErrorKind::NetworkDown => "network-down",
            TransportErrorKind::NetworkUnreachable => "network-unreachable",
            TransportErrorKind::HostDown => "host-down",
            TransportErrorKind::HostUnreachable => "host-unreachable",
            TransportErrorKind::BrokenPipe => "broken-pipe",
            TransportErrorKind::Socket => "socket",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error delivered to a handler's `on_error`.
///
/// Cloneable so that a cancellation reason can be stored in the abort signal
/// and handed to both the transport and the consumer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// The transport failed (connect, DNS, reset, timeout).
    #[error("{kind}: {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    /// The server answered with a status configured as retryable.
    #[error("request failed with HTTP {status}")]
    Status { status: u16, headers: HeaderMap },
    /// The caller or the consumer cancelled the request.
    #[error("request aborted: {reason}")]
    Aborted { reason: String },
    /// The request could not be issued as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        RequestError::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        RequestError::Aborted {
            reason: reason.into(),
        }
    }

    /// Transport error kind, if this is a transport failure.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            RequestError::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// HTTP status code, if this error was synthesized from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response headers carried by a status error.
    pub fn headers(&self) -> Option<&HeaderMap> {
        match self {
            RequestError::Status { headers, .. } => Some(headers),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RequestError::Aborted { .. })
    }
}

/// Classify a libcurl error.
pub fn classify_curl_error(e: &curl::Error) -> TransportErrorKind {
    if e.is_operation_timedout() {
        return TransportErrorKind::Timeout;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return TransportErrorKind::HostNotFound;
    }
    if e.is_couldnt_connect() {
        return TransportErrorKind::ConnectionRefused;
    }
    if e.is_send_error() {
        return TransportErrorKind::BrokenPipe;
    }
    // Server closed before the announced Content-Length was delivered.
    if e.is_partial_file() || e.is_recv_error() || e.is_read_error() || e.is_got_nothing() {
        return TransportErrorKind::ConnectionReset;
    }
    TransportErrorKind::Other
}

/// Classify a socket-level I/O error.
pub fn classify_io_error(e: &std::io::Error) -> TransportErrorKind {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof => {
            TransportErrorKind::ConnectionReset
        }
        ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
        ErrorKind::BrokenPipe => TransportErrorKind::BrokenPipe,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => TransportErrorKind::Socket,
        _ => TransportErrorKind::Other,
    }
}

impl From<&curl::Error> for RequestError {
    fn from(e: &curl::Error) -> Self {
        RequestError::transport(classify_curl_error(e), e.to_string())
    }
}

impl From<std::io::Error> for RequestError {
    fn from(e: std::io::Error) -> Self {
        RequestError::transport(classify_io_error(&e), e.to_string())
    }
}
