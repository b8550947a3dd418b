use crate::http::{classify_http_status, classify_transport, ErrorKind, HttpResponse, TransportError};
use crate::retry::Cancelled;

/// Error code the service returns when it is shedding load.
pub const SERVER_BUSY: &str = "ServerBusy";
pub const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";
pub const AUTHORIZATION_CODES: [&str; 3] = [
    "AuthorizationFailure",
    "AuthorizationPermissionMismatch",
    "AuthenticationFailed",
];

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("{0}")]
    Transport(TransportError),
    #[error("{operation}: status {status}{}", code_suffix(.code))]
    Status {
        operation: &'static str,
        status: u32,
        /// `x-ms-error-code`, when the service sent one.
        code: Option<String>,
        message: String,
    },
    #[error("container {0:?} not found: create it first (container SAS cannot create containers)")]
    ContainerNotFound(String),
    #[error("not authorized for container {0:?}; ensure a container SAS with at least rwl")]
    NotAuthorized(String),
    #[error("size mismatch: local={local}, remote={remote}")]
    SizeMismatch { local: u64, remote: u64 },
    #[error("sha256 mismatch: local={local}, remote={remote}")]
    DigestMismatch { local: String, remote: String },
    #[error("missing metadata: sha256")]
    MissingDigest,
    #[error("missing Content-Length")]
    MissingLength,
    #[error("uploaded blob not found at {0:?}")]
    NotFound(String),
    #[error("acquire storage token: {0}")]
    Credential(String),
    #[error("acquire storage token: {credential} token endpoint returned {status}: {message}")]
    TokenEndpoint {
        credential: &'static str,
        status: u32,
        message: String,
    },
    #[error("decode {what}: {message}")]
    Decode { what: &'static str, message: String },
    #[error("invalid blob endpoint {0:?}")]
    Endpoint(String),
    #[error("blob key is empty")]
    EmptyKey,
    #[error("operation cancelled")]
    Cancelled,
}

fn code_suffix(code: &Option<String>) -> String {
    match code {
        Some(c) => format!(" ({})", c),
        None => String::new(),
    }
}

impl BlobError {
    pub(crate) fn from_response(operation: &'static str, resp: &HttpResponse) -> Self {
        BlobError::Status {
            operation,
            status: resp.status,
            code: resp.headers.get("x-ms-error-code").map(str::to_string),
            message: resp.body_snippet(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            BlobError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Timeouts, 429, 408, any 5xx, and `ServerBusy` are transient, for the
    /// blob service and the token endpoint alike. Redirects are not: the blob
    /// service never moves a container.
    pub fn is_retryable(&self) -> bool {
        match self {
            BlobError::Transport(e) => classify_transport(e) == ErrorKind::Timeout,
            BlobError::Status { status, code, .. } => {
                code.as_deref() == Some(SERVER_BUSY) || transient_status(*status)
            }
            BlobError::TokenEndpoint { status, .. } => transient_status(*status),
            _ => false,
        }
    }
}

fn transient_status(status: u32) -> bool {
    matches!(
        classify_http_status(status),
        ErrorKind::Timeout | ErrorKind::Throttled | ErrorKind::Http5xx(_)
    )
}

impl From<Cancelled> for BlobError {
    fn from(_: Cancelled) -> Self {
        BlobError::Cancelled
    }
}

impl From<TransportError> for BlobError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => BlobError::Cancelled,
            other => BlobError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u32, error_code: Option<&str>) -> BlobError {
        BlobError::Status {
            operation: "put blob",
            status: code,
            code: error_code.map(String::from),
            message: String::new(),
        }
    }

    #[test]
    fn transient_statuses_retry() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert!(status(code, None).is_retryable(), "{}", code);
        }
        assert!(status(400, Some(SERVER_BUSY)).is_retryable());
    }

    #[test]
    fn client_errors_and_redirects_do_not_retry() {
        for code in [301, 307, 400, 403, 404, 409, 412] {
            assert!(!status(code, None).is_retryable(), "{}", code);
        }
        assert!(!BlobError::MissingDigest.is_retryable());
        assert!(!BlobError::SizeMismatch { local: 1, remote: 2 }.is_retryable());
        assert!(!BlobError::Cancelled.is_retryable());
    }

    #[test]
    fn token_endpoint_failures_follow_the_status_rule() {
        let token = |status| BlobError::TokenEndpoint {
            credential: "managed_identity",
            status,
            message: String::new(),
        };
        for code in [408, 429, 500, 503] {
            assert!(token(code).is_retryable(), "{}", code);
        }
        for code in [400, 401, 403] {
            assert!(!token(code).is_retryable(), "{}", code);
        }
        assert!(!BlobError::Credential("empty access_token".into()).is_retryable());
        assert_eq!(
            token(503).to_string(),
            "acquire storage token: managed_identity token endpoint returned 503: "
        );
    }

    #[test]
    fn transport_timeout_retries() {
        assert!(BlobError::from(TransportError::from(curl::Error::new(28))).is_retryable());
        assert!(matches!(BlobError::from(TransportError::Cancelled), BlobError::Cancelled));
    }

    #[test]
    fn display_includes_error_code() {
        assert_eq!(
            status(404, Some("BlobNotFound")).to_string(),
            "put blob: status 404 (BlobNotFound)"
        );
        assert_eq!(status(500, None).to_string(), "put blob: status 500");
    }
}
