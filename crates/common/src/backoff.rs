//! Backoff policies for polling loops.
//!
//! Two kinds of failure get different treatment: an ordinary transient error
//! (network, timeout, malformed response) waits a fixed short delay, while a
//! rate-limit response backs off exponentially until a request succeeds.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter.
///
/// Formula: min(max_delay, base * 2^attempt) +/- jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
            attempt: 0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new backoff.
    ///
    /// `jitter_factor` is a fraction of the delay (0.0 to 1.0); negative values are clamped to 0.
    pub fn new(base: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max_delay,
            jitter_factor: jitter_factor.max(0.0),
            attempt: 0,
        }
    }

    /// Calculate the next delay and increment the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp_delay = self.base.saturating_mul(2u32.saturating_pow(self.attempt));
        let capped_delay = exp_delay.min(self.max_delay);

        let jitter_range = capped_delay.as_secs_f64() * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_secs = (capped_delay.as_secs_f64() + jitter).max(0.0);

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_secs_f64(final_secs)
    }

    /// Reset the attempt counter after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Current attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Delay selection for one polling concern.
///
/// Each polling loop owns its own policy so that a rate-limited concern does
/// not slow down the others.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    error_delay: Duration,
    rate_limit: ExponentialBackoff,
}

impl RetryPolicy {
    /// Create a policy with a fixed error delay and an exponential rate-limit backoff.
    pub fn new(
        error_delay: Duration,
        rate_limit_base: Duration,
        rate_limit_max: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            error_delay,
            rate_limit: ExponentialBackoff::new(rate_limit_base, rate_limit_max, jitter_factor),
        }
    }

    /// A request succeeded; the next rate limit starts from the base delay again.
    pub fn on_success(&mut self) {
        self.rate_limit.reset();
    }

    /// Delay after a transient error.
    pub fn on_error(&self) -> Duration {
        self.error_delay
    }

    /// Delay after a rate-limit response.
    ///
    /// Never shorter than the venue's `retry_after` hint, nor than the error delay.
    pub fn on_rate_limited(&mut self, retry_after: Option<Duration>) -> Duration {
        let delay = self.rate_limit.next_delay().max(self.error_delay);
        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    /// Number of consecutive rate-limit responses seen.
    pub fn rate_limit_streak(&self) -> u32 {
        self.rate_limit.attempt()
    }
}
