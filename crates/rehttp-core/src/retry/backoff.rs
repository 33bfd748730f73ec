//! Backoff delays and `Retry-After` parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Exponential backoff: `min * factor^(attempt-1)`, capped at `max`.
///
/// `attempt` is 1-based (1 = first retry).
pub fn backoff_delay(attempt: u32, min: Duration, max: Duration, factor: f64) -> Duration {
    let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw_ms = min.as_secs_f64() * 1000.0 * factor.powi(exp);
    let max_ms = max.as_secs_f64() * 1000.0;
    if !raw_ms.is_finite() || raw_ms >= max_ms {
        return max;
    }
    if raw_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(raw_ms / 1000.0)
}

/// Parse a `Retry-After` value relative to `now`.
///
/// Accepts delay-seconds or an HTTP date (IMF-fixdate, RFC 850, asctime).
/// A zero delay or a date that is not in the future means retry at once.
/// Returns `None` for unparseable values, so the caller falls back to
/// exponential backoff.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: u64 = value.parse().ok()?;
        return Some(Duration::from_secs(secs));
    }
    let date = parse_http_date(value)?;
    Some((date - now).to_std().unwrap_or(Duration::ZERO))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc2822(value) {
        return Some(d.with_timezone(&Utc));
    }
    // Obsolete forms still allowed by RFC 9110.
    const OBSOLETE: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];
    OBSOLETE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
