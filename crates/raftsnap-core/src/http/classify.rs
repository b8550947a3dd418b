//! Classify HTTP statuses and transport errors for retry decisions.

use super::error::TransportError;

/// High-level classification of a failed exchange.
///
/// Callers map these onto their own retry predicate: the cluster client
/// retries everything but `Other`, the blob backend does not retry redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level timeout, or HTTP 408.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Temporary or permanent redirect (307, 308).
    Redirect,
    /// Any other 5xx.
    Http5xx(u16),
    /// Everything else (typically not retried).
    Other,
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        307 | 308 => ErrorKind::Redirect,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a transport failure. Only timeouts are transient.
pub fn classify_transport(e: &TransportError) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Other
    }
}
