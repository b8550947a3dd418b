//! Cancellation scopes for one transfer operation.
//!
//! The process owns a single root `CancellationToken` that the CLI cancels on
//! SIGINT/SIGTERM. Each cluster operation derives a `DeadlineScope` from it:
//! a child token that is also cancelled when the operation's absolute time
//! budget runs out. Every blocking call (curl transfer, backoff sleep) watches
//! the child token, so either trigger aborts the operation promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Child cancellation token bounded by an absolute deadline.
///
/// Dropping the scope stops its timer; it does not cancel the parent.
pub struct DeadlineScope {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    budget: Duration,
    timer: JoinHandle<()>,
}

impl DeadlineScope {
    /// Start a scope that cancels itself `budget` from now. Must be called
    /// inside a tokio runtime.
    pub fn new(parent: &CancellationToken, budget: Duration) -> Self {
        let token = parent.child_token();
        let expired = Arc::new(AtomicBool::new(false));
        let timer = tokio::spawn({
            let token = token.clone();
            let expired = Arc::clone(&expired);
            async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(budget) => {
                        expired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            }
        });
        Self {
            token,
            expired,
            budget,
            timer,
        }
    }

    /// Token to hand to every call made within the operation.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the deadline (rather than the parent) cancelled the scope.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl Drop for DeadlineScope {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
