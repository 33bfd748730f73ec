//! libcurl transport: one easy handle per physical attempt.
//!
//! Blocks the calling thread for the duration of the attempt; call from
//! `spawn_blocking` if used from async code.

mod attempt;

use crate::config::ClientConfig;
use crate::dispatch::{Body, Dispatch, DispatchOptions, Handler, Method};
use crate::error::RequestError;
use attempt::Attempt;
use curl::easy::{Easy, List, ReadError};
use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pending abort reason of the attempt in flight.
type AbortSlot = Arc<Mutex<Option<RequestError>>>;

fn take_abort(slot: &Mutex<Option<RequestError>>) -> Option<RequestError> {
    slot.lock().unwrap_or_else(|p| p.into_inner()).take()
}

fn is_aborted(slot: &Mutex<Option<RequestError>>) -> bool {
    slot.lock().unwrap_or_else(|p| p.into_inner()).is_some()
}

/// [`Dispatch`] on libcurl. Redirects are not followed.
#[derive(Debug, Clone)]
pub struct CurlDispatcher {
    connect_timeout: Duration,
    low_speed_limit: u32,
    low_speed_time: Duration,
    user_agent: String,
}

impl Default for CurlDispatcher {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl CurlDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            low_speed_limit: cfg.low_speed_limit_bytes,
            low_speed_time: Duration::from_secs(cfg.low_speed_time_secs),
            user_agent: cfg.user_agent.clone(),
        }
    }

    fn configure(&self, easy: &mut Easy, opts: &DispatchOptions) -> Result<(), curl::Error> {
        easy.url(&opts.url)?;
        easy.follow_location(false)?;
        easy.connect_timeout(self.connect_timeout)?;
        // Stalled transfers fail as timeouts instead of hanging forever.
        easy.low_speed_limit(self.low_speed_limit)?;
        easy.low_speed_time(self.low_speed_time)?;
        easy.useragent(&self.user_agent)?;
        easy.progress(true)?;

        let mut list = List::new();
        for (name, value) in opts.headers.iter() {
            list.append(&format!("{}: {}", name.trim(), value.trim()))?;
        }

        match &opts.body {
            Body::Empty => match opts.method {
                Method::Get => {}
                Method::Head => easy.nobody(true)?,
                Method::Post => {
                    easy.post(true)?;
                    easy.post_field_size(0)?;
                }
                other => easy.custom_request(other.as_str())?,
            },
            Body::Bytes(bytes) => {
                easy.post_fields_copy(bytes)?;
                list.append("Expect:")?;
                if opts.method != Method::Post {
                    easy.custom_request(opts.method.as_str())?;
                }
            }
            Body::Stream(_) => {
                easy.post(true)?;
                list.append("Transfer-Encoding: chunked")?;
                list.append("Expect:")?;
                if opts.method != Method::Post {
                    easy.custom_request(opts.method.as_str())?;
                }
            }
        }
        easy.http_headers(list)?;
        Ok(())
    }
}

impl Dispatch for CurlDispatcher {
    fn dispatch(&self, opts: DispatchOptions, handler: &mut dyn Handler) {
        let abort_slot: AbortSlot = Arc::default();
        let slot = Arc::clone(&abort_slot);
        handler.on_connect(Box::new(move |reason| {
            slot.lock()
                .unwrap_or_else(|p| p.into_inner())
                .get_or_insert(reason);
        }));
        if let Some(reason) = take_abort(&abort_slot) {
            handler.on_error(reason);
            return;
        }

        let mut easy = Easy::new();
        if let Err(e) = self.configure(&mut easy, &opts) {
            handler.on_error(RequestError::InvalidRequest(format!(
                "configuring {} {}: {e}",
                opts.method, opts.url
            )));
            return;
        }

        let attempt = RefCell::new(Attempt::new(handler));
        let result = perform(&mut easy, &opts.body, &attempt, &abort_slot);
        attempt.into_inner().finish(result, take_abort(&abort_slot));
    }
}

fn perform<H: Handler + ?Sized>(
    easy: &mut Easy,
    body: &Body,
    attempt: &RefCell<Attempt<'_, H>>,
    abort: &Mutex<Option<RequestError>>,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.header_function(|line| !is_aborted(abort) && attempt.borrow_mut().on_header_line(line))?;
    transfer.write_function(|data| {
        let keep_going = attempt.borrow_mut().on_body(data);
        // A short write makes libcurl fail the transfer.
        if keep_going && !is_aborted(abort) {
            Ok(data.len())
        } else {
            Ok(0)
        }
    })?;
    transfer.progress_function(|_, _, _, _| !is_aborted(abort))?;
    if let Body::Stream(stream) = body {
        transfer.read_function(|buf| {
            stream.read(buf).map_err(|e| {
                tracing::debug!(error = %e, "request body read failed");
                ReadError::Abort
            })
        })?;
    }
    transfer.perform()
}
