//! Parse HTTP response header lines.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Response headers in arrival order, looked up case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Build from raw `Name: value` lines; lines without a colon are ignored.
    pub fn from_lines(lines: &[String]) -> Self {
        let entries = lines
            .iter()
            .filter_map(|line| {
                let (name, value) = line.trim().split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();
        Headers { entries }
    }

    /// First value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.parse().ok()
    }

    /// Server-requested cool-down from `Retry-After`, relative to `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        parse_retry_after(self.get("retry-after")?, now)
    }
}

/// Status code from a status line such as `HTTP/1.1 307 Temporary Redirect`.
pub fn parse_status_line(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

/// `Retry-After` as delta-seconds or an HTTP-date. Dates in the past and
/// unparseable values yield `None` (no extra wait).
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    (at.with_timezone(&Utc) - now).to_std().ok()
}
