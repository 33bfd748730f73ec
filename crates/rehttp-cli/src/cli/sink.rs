//! Handler that writes the response body to a file or stdout.

use anyhow::{bail, Context, Result};
use rehttp_core::{AbortFn, Handler, HeaderMap, RequestError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// What a finished request looked like.
#[derive(Debug)]
pub struct Summary {
    pub status: u16,
    pub headers: HeaderMap,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the body, when requested.
    pub sha256: Option<String>,
}

pub struct BodySink {
    out: Box<dyn Write + Send>,
    hasher: Option<Sha256>,
    status: Option<u16>,
    headers: HeaderMap,
    bytes: u64,
    abort: Option<AbortFn>,
    write_error: Option<io::Error>,
    outcome: Option<Result<(), RequestError>>,
}

impl BodySink {
    pub fn new(out: Box<dyn Write + Send>, sha256: bool) -> Self {
        Self {
            out,
            hasher: sha256.then(Sha256::new),
            status: None,
            headers: HeaderMap::new(),
            bytes: 0,
            abort: None,
            write_error: None,
            outcome: None,
        }
    }

    /// Body goes to `path`, or stdout when `None`.
    pub fn open(path: Option<&Path>, sha256: bool) -> Result<Self> {
        let out: Box<dyn Write + Send> = match path {
            Some(p) => Box::new(BufWriter::new(
                File::create(p).with_context(|| format!("create {}", p.display()))?,
            )),
            None => Box::new(io::stdout()),
        };
        Ok(Self::new(out, sha256))
    }

    /// Body is dropped; only status and headers are kept.
    pub fn discard() -> Self {
        Self::new(Box::new(io::sink()), false)
    }

    pub fn finish(mut self) -> Result<Summary> {
        if let Some(e) = self.write_error.take() {
            return Err(e).context("write response body");
        }
        self.out.flush().context("flush response body")?;
        match self.outcome.take() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e).context("request failed"),
            None => bail!("request ended without an outcome"),
        }
        let Some(status) = self.status else {
            bail!("request completed without a response");
        };
        Ok(Summary {
            status,
            headers: self.headers,
            bytes: self.bytes,
            sha256: self.hasher.map(|h| hex::encode(h.finalize())),
        })
    }
}

impl Handler for BodySink {
    fn on_connect(&mut self, abort: AbortFn) {
        self.abort = Some(abort);
    }

    fn on_headers(&mut self, status: u16, headers: &HeaderMap) -> bool {
        tracing::debug!(status, "response head");
        self.status = Some(status);
        self.headers = headers.clone();
        true
    }

    fn on_data(&mut self, chunk: &[u8]) -> bool {
        if self.write_error.is_some() {
            return false;
        }
        if let Err(e) = self.out.write_all(chunk) {
            let reason = RequestError::aborted(format!("writing body: {e}"));
            self.write_error = Some(e);
            if let Some(abort) = self.abort.take() {
                abort(reason);
            }
            return false;
        }
        if let Some(h) = self.hasher.as_mut() {
            h.update(chunk);
        }
        self.bytes += chunk.len() as u64;
        true
    }

    fn on_complete(&mut self, _trailers: &HeaderMap) {
        self.outcome = Some(Ok(()));
    }

    fn on_error(&mut self, err: RequestError) {
        self.outcome = Some(Err(err));
    }
}
