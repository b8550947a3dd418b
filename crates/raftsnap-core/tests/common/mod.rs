//! Shared fixtures for integration tests.
#![allow(dead_code)]

pub mod script_server;

use std::time::Duration;

use raftsnap_core::retry::RetryPolicy;

/// Fast policy so retry tests finish in milliseconds.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        multiplier: 2.0,
        jitter: false,
    }
}
