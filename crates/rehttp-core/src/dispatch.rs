//! Handler protocol and dispatch options.
//!
//! A [`Dispatch`] implementation issues one physical attempt and drives the
//! callbacks of a [`Handler`] serially on the calling thread. Every attempt
//! ends with exactly one `on_complete` or `on_error`.

use crate::error::RequestError;
use crate::headers::HeaderMap;
use crate::signal::AbortSignal;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Aborts the attempt it was handed out for. The transport finishes the
/// attempt with `on_error(reason)`.
pub type AbortFn = Box<dyn FnOnce(RequestError) + Send>;

/// Receiver of one request's lifecycle events.
pub trait Handler {
    /// A physical attempt is about to start; `abort` cancels it.
    fn on_connect(&mut self, abort: AbortFn) {
        let _ = abort;
    }

    /// Response head. Returning `false` stops the attempt; the transport then
    /// ends it with `on_error`.
    fn on_headers(&mut self, status: u16, headers: &HeaderMap) -> bool;

    /// Body chunk. Returning `false` asks the source to pause.
    fn on_data(&mut self, chunk: &[u8]) -> bool;

    fn on_complete(&mut self, trailers: &HeaderMap);

    fn on_error(&mut self, err: RequestError);
}

/// Issues physical attempts.
pub trait Dispatch {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler);
}

impl<D: Dispatch + ?Sized> Dispatch for &D {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler) {
        (**self).dispatch(opts, handler)
    }
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler) {
        (**self).dispatch(opts, handler)
    }
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Patch,
    Connect,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
            Method::Connect => "CONNECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let m = match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "PATCH" => Method::Patch,
            "CONNECT" => Method::Connect,
            _ => return None,
        };
        Some(m)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming request body. Clones share the same source and read counter.
#[derive(Clone)]
pub struct StreamBody {
    source: Arc<Mutex<Box<dyn Read + Send>>>,
    consumed: Arc<AtomicU64>,
}

impl StreamBody {
    pub fn new(source: impl Read + Send + 'static) -> Self {
        Self {
            source: Arc::new(Mutex::new(Box::new(source))),
            consumed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut source = self
            .source
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "body source poisoned"))?;
        let n = source.read(buf)?;
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// Bytes pulled from the source so far.
    pub fn bytes_read(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("bytes_read", &self.bytes_read())
            .finish()
    }
}

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Fixed buffer; always replayable.
    Bytes(Bytes),
    /// Arbitrary stream; not replayable once any byte was read.
    Stream(StreamBody),
}

impl Body {
    /// True once part of a non-replayable body has been sent.
    pub fn is_disturbed(&self) -> bool {
        match self {
            Body::Stream(s) => s.bytes_read() > 0,
            Body::Empty | Body::Bytes(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(b) => b.is_empty(),
            Body::Stream(_) => false,
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

/// Options for one logical request. Cloned per attempt; the caller's value is
/// never modified.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
    /// Cancellation for the whole logical request.
    pub signal: Option<AbortSignal>,
}

impl DispatchOptions {
    /// Validates that `url` is an absolute http(s) URL.
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| RequestError::InvalidRequest(format!("invalid URL {url}: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RequestError::InvalidRequest(format!(
                    "unsupported scheme {other} in {url}"
                )))
            }
        }
        Ok(Self {
            method,
            url: parsed.to_string(),
            headers: HeaderMap::new(),
            body: Body::Empty,
            signal: None,
        })
    }

    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::Get, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}
