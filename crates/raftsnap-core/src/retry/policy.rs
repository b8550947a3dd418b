use rand::Rng;
use std::time::Duration;

/// Fraction of the nominal delay used as the jitter band (±20%).
pub const JITTER_FRACTION: f64 = 0.2;

/// Exponential backoff policy, supplied per call and never mutated.
///
/// `max_attempts` counts the first attempt. A policy with `max_attempts == 0`
/// is treated as unset and replaced by [`RetryPolicy::default`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single backoff sleep.
    pub max_delay: Duration,
    /// Growth factor applied to the base delay after each retried attempt.
    pub multiplier: f64,
    /// Perturb each sleep by up to ±20%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// The policy actually used by the engine: this one, or the default when unset.
    pub fn effective(&self) -> RetryPolicy {
        if self.max_attempts == 0 {
            RetryPolicy::default()
        } else {
            *self
        }
    }

    /// Backoff state machine starting at `initial_delay`.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// Delay sequence for one retry loop.
///
/// The unjittered base delay is what grows between attempts; jitter only
/// affects the value returned for the current sleep.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Backoff {
    /// Nominal (unjittered) delay for the next sleep.
    pub fn nominal(&self) -> Duration {
        self.base
    }

    /// Delay to sleep now, then advance the base for the following attempt.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let sleep = if self.jitter {
            jittered(self.base, rng)
        } else {
            self.base
        };
        self.advance();
        sleep.min(self.max_delay)
    }

    fn advance(&mut self) {
        let grown = Duration::try_from_secs_f64(self.base.as_secs_f64() * self.multiplier)
            .ok()
            .filter(|next| *next > self.base)
            .unwrap_or(self.base);
        self.base = grown.min(self.max_delay);
    }
}

/// `nominal` perturbed uniformly within ±20%, floored at zero.
fn jittered<R: Rng + ?Sized>(nominal: Duration, rng: &mut R) -> Duration {
    let factor = 1.0 + rng.gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let secs = (nominal.as_secs_f64() * factor).max(0.0);
    Duration::try_from_secs_f64(secs).unwrap_or(nominal)
}
