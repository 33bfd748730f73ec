//! Minimal HTTP/1.1 server that misbehaves on demand, for retry/resume tests.
//!
//! Serves a single static body with a strong ETag, honours `Range: bytes=X-Y`
//! and `If-Match`. Each accepted connection consumes the next scripted
//! [`Behavior`]; once the script is exhausted connections are served normally.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const ETAG: &str = "\"v1\"";
const CHANGED_ETAG: &str = "\"v2\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Send the head and this many body bytes, then close the connection.
    DropAfter(usize),
    /// Reply with this status and an empty body.
    Status(u16),
    /// The resource was replaced: serve it under a different ETag.
    Changed,
    Serve,
}

/// Request head as seen by the server.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub range: Option<String>,
    pub if_match: Option<String>,
}

pub struct FlakyServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FlakyServer {
    /// Starts a server in a background thread. It runs until the process exits.
    pub fn start(body: Vec<u8>, script: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let body = Arc::new(body);
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();
        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let behavior = script.lock().unwrap().pop_front().unwrap_or(Behavior::Serve);
                handle(stream, &body, behavior, &seen);
            }
        });
        Self {
            url: format!("http://127.0.0.1:{}/file.bin", port),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    behavior: Behavior,
    seen: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    seen.lock().unwrap().push(request.clone());

    if let Behavior::Status(code) = behavior {
        let response = format!(
            "HTTP/1.1 {code} Scripted\r\nContent-Length: 0\r\nRetry-After: 0\r\nConnection: close\r\n\r\n"
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let etag = if behavior == Behavior::Changed { CHANGED_ETAG } else { ETAG };
    if let Some(expected) = &request.if_match {
        if expected != etag {
            let _ = stream.write_all(
                b"HTTP/1.1 412 Precondition Failed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            return;
        }
    }

    let total = body.len() as u64;
    let (status, content_range, slice) = match request.range.as_deref().and_then(parse_range) {
        Some((start, end_incl)) if start < total => {
            let end_excl = end_incl.saturating_add(1).min(total);
            let slice = &body[start as usize..end_excl as usize];
            (
                "206 Partial Content",
                format!("Content-Range: bytes {}-{}/{}\r\n", start, end_excl - 1, total),
                slice,
            )
        }
        Some(_) => {
            let response = format!(
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{total}\r\nContent-Length: 0\r\n\r\n"
            );
            let _ = stream.write_all(response.as_bytes());
            return;
        }
        None => ("200 OK", String::new(), body),
    };

    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\n{content_range}ETag: {etag}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        slice.len()
    );
    let _ = stream.write_all(head.as_bytes());
    match behavior {
        Behavior::DropAfter(n) => {
            let _ = stream.write_all(&slice[..n.min(slice.len())]);
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Both);
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

fn read_head(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&raw);
    let mut lines = text.lines();
    let method = lines.next()?.split_whitespace().next()?.to_string();
    let mut request = RecordedRequest {
        method,
        ..RecordedRequest::default()
    };
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim().to_string();
            match name.trim().to_ascii_lowercase().as_str() {
                "range" => request.range = Some(value),
                "if-match" => request.if_match = Some(value),
                _ => {}
            }
        }
    }
    Some(request)
}

/// `bytes=X-Y` or `bytes=X-` as (start, end_inclusive).
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let range = value.trim().strip_prefix("bytes=")?;
    let (a, b) = range.split_once('-')?;
    let start = a.trim().parse().ok()?;
    let end = match b.trim() {
        "" => u64::MAX,
        e => e.parse().ok()?,
    };
    Some((start, end))
}
