//! Result of one HTTP attempt against the cluster.

use std::time::Duration;

use chrono::Utc;
use url::Url;

use super::error::ClusterError;
use crate::http::{classify_http_status, ErrorKind, HttpResponse, TransportError};

/// What a single attempt produced, before the retry loop sees it.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success,
    /// Leader moved; the next attempt goes to `location`.
    Redirect { status: u32, location: String },
    RetryableFailure {
        error: ClusterError,
        retry_after: Option<Duration>,
    },
    FatalFailure(ClusterError),
}

impl AttemptOutcome {
    /// Classify a response to a request sent to `url`.
    pub fn from_response(url: &str, resp: &HttpResponse, ok: &[u32]) -> Self {
        let status = resp.status;
        if ok.contains(&status) {
            return AttemptOutcome::Success;
        }
        if matches!(status, 307 | 308) {
            if let Some(location) = resp
                .headers
                .get("location")
                .and_then(|l| resolve_redirect(url, l))
            {
                return AttemptOutcome::Redirect { status, location };
            }
        }
        let retry_after = resp.headers.retry_after(Utc::now());
        let error = ClusterError::Status {
            status,
            retry_after,
            message: resp.body_snippet(),
        };
        if classify_http_status(status) == ErrorKind::Other {
            AttemptOutcome::FatalFailure(error)
        } else {
            AttemptOutcome::RetryableFailure { error, retry_after }
        }
    }

    pub fn from_transport(e: TransportError) -> Self {
        let error = ClusterError::from(e);
        if error.is_retryable() {
            AttemptOutcome::RetryableFailure {
                error,
                retry_after: None,
            }
        } else {
            AttemptOutcome::FatalFailure(error)
        }
    }
}

/// Next target for a redirect: an absolute `Location` verbatim, a relative
/// one joined onto the request URL.
pub fn resolve_redirect(base: &str, location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    if Url::parse(location).is_ok() {
        return Some(location.to_string());
    }
    let base = Url::parse(base).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;

    fn response(status: u32, headers: &[&str]) -> HttpResponse {
        let lines: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        HttpResponse {
            status,
            headers: Headers::from_lines(&lines),
            body: Vec::new(),
            file_bytes: None,
        }
    }

    const SNAPSHOT: &str = "https://a/v1/sys/storage/raft/snapshot";

    #[test]
    fn relative_location_joins_base() {
        assert_eq!(
            resolve_redirect(SNAPSHOT, "/v1/new-leader").as_deref(),
            Some("https://a/v1/new-leader")
        );
    }

    #[test]
    fn absolute_location_is_verbatim() {
        assert_eq!(
            resolve_redirect(SNAPSHOT, "https://vault-2:8200/v1/sys/storage/raft/snapshot").as_deref(),
            Some("https://vault-2:8200/v1/sys/storage/raft/snapshot")
        );
        assert_eq!(resolve_redirect(SNAPSHOT, "  "), None);
    }

    #[test]
    fn redirect_outcome_carries_resolved_target() {
        let out = AttemptOutcome::from_response(SNAPSHOT, &response(307, &["Location: /v1/new-leader"]), &[200]);
        match out {
            AttemptOutcome::Redirect { status, location } => {
                assert_eq!(status, 307);
                assert_eq!(location, "https://a/v1/new-leader");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn redirect_without_location_is_retryable_status() {
        let out = AttemptOutcome::from_response(SNAPSHOT, &response(308, &[]), &[200]);
        assert!(matches!(out, AttemptOutcome::RetryableFailure { .. }));
    }

    #[test]
    fn throttled_response_carries_retry_after() {
        let out = AttemptOutcome::from_response(SNAPSHOT, &response(429, &["Retry-After: 2"]), &[200]);
        match out {
            AttemptOutcome::RetryableFailure { retry_after, error } => {
                assert_eq!(retry_after, Some(Duration::from_secs(2)));
                assert_eq!(error.status(), Some(429));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn success_set_and_fatal_statuses() {
        assert!(matches!(
            AttemptOutcome::from_response(SNAPSHOT, &response(204, &[]), &[200, 204]),
            AttemptOutcome::Success
        ));
        assert!(matches!(
            AttemptOutcome::from_response(SNAPSHOT, &response(204, &[]), &[200]),
            AttemptOutcome::FatalFailure(_)
        ));
        assert!(matches!(
            AttemptOutcome::from_response(SNAPSHOT, &response(403, &[]), &[200]),
            AttemptOutcome::FatalFailure(_)
        ));
    }

    #[test]
    fn transport_timeout_is_retryable() {
        let out = AttemptOutcome::from_transport(TransportError::from(curl::Error::new(28)));
        assert!(matches!(out, AttemptOutcome::RetryableFailure { retry_after: None, .. }));
        let out = AttemptOutcome::from_transport(TransportError::Cancelled);
        assert!(matches!(out, AttemptOutcome::FatalFailure(ClusterError::Cancelled)));
    }
}
