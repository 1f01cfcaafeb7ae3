use core::time::Duration;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Backoff policy used to construct an exponential backoff iterator.
///
/// Governs how long a transaction waits for a lock held by another transaction to clear
/// before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier_times_100: u64, // e.g. 200 for 2.0
    pub jitter_frac_times_100: u64, // e.g. 25 for 0.25
    pub max_retries: u32,
    pub max_elapsed_ms: u64,
}

impl BackoffPolicy {
    /// Doubling backoff with 25% jitter.
    pub const fn exponential(base_ms: u64, max_ms: u64, max_retries: u32) -> Self {
        Self {
            base_ms,
            max_ms,
            multiplier_times_100: 200,
            jitter_frac_times_100: 25,
            max_retries,
            max_elapsed_ms: u64::MAX,
        }
    }

    /// Doubling backoff without jitter.
    pub const fn no_jitter(base_ms: u64, max_ms: u64, max_retries: u32) -> Self {
        Self {
            jitter_frac_times_100: 0,
            ..Self::exponential(base_ms, max_ms, max_retries)
        }
    }

    /// Disable retries entirely. Loops that consult `exhausted()` will give up
    /// immediately and never sleep.
    pub const fn disabled() -> Self {
        Self {
            base_ms: 0,
            max_ms: 0,
            multiplier_times_100: 100,
            jitter_frac_times_100: 0,
            max_retries: 0,
            max_elapsed_ms: 0,
        }
    }

    pub const fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed_ms = max_elapsed.as_millis() as u64;
        self
    }

    pub const fn is_disabled(&self) -> bool {
        self.max_retries == 0
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Runtime-agnostic exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pol: BackoffPolicy,
    attempt: u32,
    start: Instant,
    rng: u64,
}

impl ExponentialBackoff {
    pub fn new(pol: BackoffPolicy) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self {
            pol,
            attempt: 0,
            start: Instant::now(),
            rng: seed ^ 0x9e3779b97f4a7c15,
        }
    }

    #[inline]
    pub fn exhausted(&self) -> bool {
        self.attempt >= self.pol.max_retries
            || self.start.elapsed() >= Duration::from_millis(self.pol.max_elapsed_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Compute the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(63);
        self.attempt = self.attempt.saturating_add(1);
        let mut scaled = self.pol.base_ms.saturating_mul(100);
        for _ in 0..exp {
            scaled = scaled.saturating_mul(self.pol.multiplier_times_100) / 100;
            if scaled / 100 >= self.pol.max_ms {
                break;
            }
        }
        let capped = (scaled / 100).min(self.pol.max_ms);
        if self.pol.jitter_frac_times_100 == 0 {
            return Duration::from_millis(capped.max(1));
        }
        let jf = self.pol.jitter_frac_times_100 as f64 / 100.0;
        let low = (1.0 - jf).max(0.0);
        let factor = low + (1.0 + jf - low) * self.next_unit();
        Duration::from_millis(((capped as f64 * factor) as u64).max(1))
    }

    fn next_unit(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        let y = x.wrapping_mul(0x2545F4914F6CDD1D);
        (y >> 11) as f64 / ((u64::MAX >> 11) as f64)
    }
}
