//! Cancellation marker returned by the retry loop.

use std::fmt;

/// The caller's cancellation fired while the retry loop was waiting.
///
/// Error types used with [`super::execute`] implement `From<Cancelled>` so the
/// loop can hand back cancellation in the caller's own error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}
