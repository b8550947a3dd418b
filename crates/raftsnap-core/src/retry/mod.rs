//! Retry and backoff engine.
//!
//! A pure control abstraction: runs an async attempt under an exponential
//! backoff policy with a caller-supplied retryability predicate. It knows
//! nothing about HTTP or providers; the Raft client and the blob
//! backend each bring their own predicate.

mod error;
mod policy;
mod run;

pub use error::Cancelled;
pub use policy::{Backoff, RetryPolicy, JITTER_FRACTION};
pub use run::{execute, sleep_or_cancel};
