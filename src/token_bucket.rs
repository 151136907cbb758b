//! Token-bucket admission control (§4.1).
//!
//! A synchronous, non-blocking, never-failing `consume` that is a pure
//! function of `(rate, burst, last_refill, now)`. There is no distributed
//! store or CAS machinery here — admission is purely in-process, so a
//! `Mutex`-guarded struct is the cheapest correct critical section.

use std::sync::Mutex;

use crate::clock::Clock;
use crate::config::RateLimiterConfig;

/// Current token count and last refill instant (§3 `BucketState`).
#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

/// Admits or denies calls against a refilling budget, with burst.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    config: RateLimiterConfig,
    clock: std::sync::Arc<dyn Clock>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig, clock: std::sync::Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self { state: Mutex::new(BucketState { tokens: config.max_burst, last_refill_ms: now }), config, clock }
    }

    /// Returns `true` if `n` tokens can be deducted right now; never
    /// blocks, never panics on clock skew (negative elapsed is clamped to
    /// zero).
    pub fn consume(&self, n: f64) -> bool {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().expect("token bucket mutex poisoned");

        let elapsed_ms = now.saturating_sub(state.last_refill_ms) as f64;
        let refill_per_ms = self.config.rate_limit / self.config.window_ms as f64;
        state.tokens = (state.tokens + elapsed_ms * refill_per_ms).min(self.config.max_burst);
        state.last_refill_ms = now;

        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Current token count, for diagnostics/tests.
    pub fn tokens(&self) -> f64 {
        self.state.lock().expect("token bucket mutex poisoned").tokens
    }

    /// Reset to a fresh config, refilling to its `max_burst`.
    pub fn reconfigure(&mut self, config: RateLimiterConfig) {
        let now = self.clock.now_millis();
        *self.state.lock().expect("token bucket mutex poisoned") =
            BucketState { tokens: config.max_burst, last_refill_ms: now };
        self.config = config;
    }
}
