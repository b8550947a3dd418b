//! Transport-level failures of a single HTTP exchange.

/// Why a request produced no usable response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Curl gave up waiting (connect or whole-transfer timeout).
    #[error("request timed out: {0}")]
    Timeout(curl::Error),
    /// The cancellation token fired mid-transfer.
    #[error("request cancelled")]
    Cancelled,
    /// Any other curl failure (DNS, refused connection, TLS, reset).
    #[error("{0}")]
    Curl(curl::Error),
    /// Reading the request body or writing the response file failed.
    #[error("local file: {0:#}")]
    Storage(anyhow::Error),
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("http task failed: {0}")]
    Join(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        if e.is_operation_timedout() {
            TransportError::Timeout(e)
        } else if e.is_aborted_by_callback() {
            TransportError::Cancelled
        } else {
            TransportError::Curl(e)
        }
    }
}
