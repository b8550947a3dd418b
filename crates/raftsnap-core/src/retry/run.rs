//! Retry loop: run an async attempt until success, a fatal error, exhaustion, or cancellation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::Cancelled;
use super::policy::RetryPolicy;

/// Runs `attempt` under `policy` until it succeeds or the loop must stop.
///
/// `attempt` receives the 1-based attempt number. A failed attempt ends the
/// loop when `is_retryable` rejects its error or when `max_attempts` is
/// reached; that error is returned as-is. Otherwise the loop sleeps for the
/// next backoff delay. The sleep races `cancel`: if cancellation wins, the
/// loop returns `E::from(Cancelled)` without another attempt.
pub async fn execute<T, E, P, F, Fut>(
    cancel: &CancellationToken,
    policy: &RetryPolicy,
    is_retryable: P,
    mut attempt: F,
) -> Result<T, E>
where
    E: From<Cancelled> + Display,
    P: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let policy = policy.effective();
    let mut backoff = policy.backoff();
    let mut n = 0u32;
    loop {
        n += 1;
        let err = match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        if !is_retryable(&err) {
            tracing::debug!(attempt = n, error = %err, "not retryable");
            return Err(err);
        }
        if n >= policy.max_attempts {
            tracing::debug!(attempt = n, error = %err, "retry attempts exhausted");
            return Err(err);
        }
        let delay = backoff.next_delay(&mut rand::thread_rng());
        tracing::debug!(
            attempt = n,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after backoff"
        );
        sleep_or_cancel(cancel, delay).await?;
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal(u32),
        Cancelled,
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn retryable(e: &TestError) -> bool {
        matches!(e, TestError::Transient(_))
    }

    fn fixed(max_attempts: u32, initial_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_expected_delays() {
        let cancel = CancellationToken::new();
        let starts = Mutex::new(Vec::new());
        let res: Result<u32, TestError> = execute(&cancel, &fixed(3, 100, 1_000), retryable, |n| {
            starts.lock().unwrap().push(Instant::now());
            async move {
                if n < 3 {
                    Err(TestError::Transient(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(res, Ok(3));
        let starts = starts.into_inner().unwrap();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], Duration::from_millis(100));
        assert_eq!(starts[2] - starts[1], Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_error_after_exactly_n_calls() {
        let cancel = CancellationToken::new();
        let calls = Mutex::new(0u32);
        let res: Result<(), TestError> = execute(&cancel, &fixed(4, 10, 50), retryable, |n| {
            *calls.lock().unwrap() += 1;
            async move { Err(TestError::Transient(n)) }
        })
        .await;
        assert_eq!(res, Err(TestError::Transient(4)));
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_short_circuits() {
        let cancel = CancellationToken::new();
        let calls = Mutex::new(0u32);
        let res: Result<(), TestError> = execute(&cancel, &fixed(5, 10, 50), retryable, |n| {
            *calls.lock().unwrap() += 1;
            async move { Err(TestError::Fatal(n)) }
        })
        .await;
        assert_eq!(res, Err(TestError::Fatal(1)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unset_policy_falls_back_to_five_attempts() {
        let cancel = CancellationToken::new();
        let calls = Mutex::new(0u32);
        let unset = RetryPolicy {
            max_attempts: 0,
            ..fixed(1, 1, 1)
        };
        let res: Result<(), TestError> = execute(&cancel, &unset, retryable, |n| {
            *calls.lock().unwrap() += 1;
            async move { Err(TestError::Transient(n)) }
        })
        .await;
        assert_eq!(res, Err(TestError::Transient(5)));
        assert_eq!(*calls.lock().unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_the_loop() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let calls = Mutex::new(0u32);
        let res: Result<(), TestError> =
            execute(&cancel, &fixed(5, 10_000, 10_000), retryable, |n| {
                *calls.lock().unwrap() += 1;
                async move { Err(TestError::Transient(n)) }
            })
            .await;
        assert_eq!(res, Err(TestError::Cancelled));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_cancel_returns_immediately_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let start = Instant::now();
        assert_eq!(
            sleep_or_cancel(&cancel, Duration::from_secs(60)).await,
            Err(Cancelled)
        );
        assert_eq!(Instant::now(), start);
    }
}
