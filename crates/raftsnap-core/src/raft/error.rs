use std::time::Duration;

use crate::http::{classify_http_status, classify_transport, ErrorKind, TransportError};
use crate::retry::Cancelled;

/// Failure of a snapshot save or restore against the cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{0}")]
    Transport(TransportError),
    #[error("unexpected status {status}{}", detail(.message))]
    Status {
        status: u32,
        retry_after: Option<Duration>,
        message: String,
    },
    #[error("redirected ({status}) to {location}")]
    Redirect { status: u32, location: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation deadline of {}s exceeded", .0.as_secs())]
    DeadlineExceeded(Duration),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

impl ClusterError {
    /// Retry predicate for cluster calls: transport timeouts, redirects, and
    /// 429/408/503/5xx statuses.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClusterError::Transport(e) => classify_transport(e) == ErrorKind::Timeout,
            ClusterError::Status { status, .. } => classify_http_status(*status) != ErrorKind::Other,
            ClusterError::Redirect { .. } => true,
            ClusterError::Cancelled | ClusterError::DeadlineExceeded(_) | ClusterError::Io { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u32> {
        match self {
            ClusterError::Status { status, .. } | ClusterError::Redirect { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<Cancelled> for ClusterError {
    fn from(_: Cancelled) -> Self {
        ClusterError::Cancelled
    }
}

impl From<TransportError> for ClusterError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => ClusterError::Cancelled,
            other => ClusterError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u32) -> ClusterError {
        ClusterError::Status {
            status: code,
            retry_after: None,
            message: String::new(),
        }
    }

    #[test]
    fn retryable_statuses() {
        for code in [429, 408, 503, 500, 502, 504, 307, 308] {
            assert!(status(code).is_retryable(), "{}", code);
        }
        for code in [400, 401, 403, 404, 412] {
            assert!(!status(code).is_retryable(), "{}", code);
        }
    }

    #[test]
    fn timeouts_retry_other_transport_errors_do_not() {
        let timeout = ClusterError::from(TransportError::from(curl::Error::new(28)));
        assert!(timeout.is_retryable());
        let refused = ClusterError::from(TransportError::from(curl::Error::new(7)));
        assert!(!refused.is_retryable());
    }

    #[test]
    fn cancellation_keeps_its_kind() {
        assert!(matches!(
            ClusterError::from(TransportError::Cancelled),
            ClusterError::Cancelled
        ));
        assert!(matches!(ClusterError::from(Cancelled), ClusterError::Cancelled));
        assert!(!ClusterError::Cancelled.is_retryable());
        assert!(!ClusterError::DeadlineExceeded(Duration::from_secs(600)).is_retryable());
    }

    #[test]
    fn status_message_formatting() {
        let e = ClusterError::Status {
            status: 403,
            retry_after: None,
            message: "{\"errors\":[\"permission denied\"]}".into(),
        };
        assert_eq!(
            e.to_string(),
            "unexpected status 403: {\"errors\":[\"permission denied\"]}"
        );
        assert_eq!(status(500).to_string(), "unexpected status 500");
        assert_eq!(status(500).status(), Some(500));
    }
}
