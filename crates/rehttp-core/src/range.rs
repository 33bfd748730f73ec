//! `Range` / `Content-Range` byte-range handling.
//!
//! Offsets are tracked half-open (`[start, end)`); the wire format uses an
//! inclusive last-byte position.

/// A parsed `Content-Range: bytes <first>-<last>/<complete>` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte position (inclusive).
    pub start: u64,
    /// Last byte position as sent (inclusive).
    pub last: u64,
    /// Complete length, `None` for `*`.
    pub complete: Option<u64>,
}

impl ContentRange {
    /// Parse a `Content-Range` header value. Returns `None` for anything but a
    /// satisfied byte range (`bytes */N` is not a range).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let rest = strip_prefix_ignore_case(value, "bytes")?;
        let rest = rest.strip_prefix(' ')?.trim_start();
        let (span, complete) = rest.split_once('/')?;
        let (first, last) = span.trim().split_once('-')?;
        let start = parse_decimal(first)?;
        let last = parse_decimal(last)?;
        if last < start {
            return None;
        }
        let complete = match complete.trim() {
            "*" => None,
            n => Some(parse_decimal(n)?),
        };
        Some(Self {
            start,
            last,
            complete,
        })
    }

    /// Exclusive end offset of this range.
    ///
    /// Some servers echo the complete length as the last position
    /// (`bytes 3-6/6`); the end is clamped to the complete length so both
    /// forms describe the same resource end.
    pub fn end(&self) -> u64 {
        let end = self.last.saturating_add(1);
        match self.complete {
            Some(total) => end.min(total),
            None => end,
        }
    }
}

/// `Range` request header value for resuming at `start`.
///
/// `end` is exclusive; `None` asks for an open-ended suffix.
pub fn range_header_value(start: u64, end: Option<u64>) -> String {
    match end {
        Some(end) if end > start => format!("bytes={}-{}", start, end - 1),
        Some(_) => format!("bytes={}-{}", start, start),
        None => format!("bytes={}-", start),
    }
}

/// Parse a `Content-Length` value: a plain non-negative decimal integer.
pub fn parse_content_length(value: &str) -> Option<u64> {
    parse_decimal(value)
}

fn parse_decimal(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}
