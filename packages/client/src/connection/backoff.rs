//! Exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;

/// Retry delay schedule: attempt `n` (1-based) waits a uniformly random
/// duration in `0..=min(cap, base × 2^(n-1))`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Attempts made since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Upper bound of the delay for a given 1-based attempt
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap)
    }

    /// Register one more attempt and return how long to wait before it.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        full_jitter(self.ceiling(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn full_jitter(ceiling: Duration) -> Duration {
    let ceiling_ms = ceiling.as_millis() as u64;
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ceiling_ms))
}
