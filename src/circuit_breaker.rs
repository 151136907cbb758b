//! Circuit breaker (§4.2): CLOSED → OPEN → HALF_OPEN, transitions evaluated
//! lazily on each call rather than by a background timer.
//!
//! Uses a lock-free `AtomicU8` state machine with CAS-guarded transitions
//! to guarantee a single in-flight half-open probe without a mutex on the
//! hot path. The surrounding policy — failure accounting, success-threshold
//! closing, percentage-based opening, error classification — is layered on
//! top of that guarantee.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::error::{CallError, ErrorKind};
use crate::telemetry::{Broadcaster, Event};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Diagnostic ring buffer capacity for the percentage-based opening rule.
const HISTORY_CAPACITY: usize = 100;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

fn decode(raw: u8) -> CircuitState {
    match raw {
        STATE_CLOSED => CircuitState::Closed,
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        other => unreachable!("invalid circuit breaker state byte: {other}"),
    }
}

/// Shared, lock-free breaker state. Split out from [`CircuitBreaker`] so a
/// [`crate::CircuitBreakerRegistry`] can hand out `Arc` clones keyed by
/// endpoint id while the breaker itself stays cheap to construct per call
/// site.
#[derive(Debug)]
pub struct CircuitBreakerState {
    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    opened_at_millis: AtomicU64,
    /// CAS-guarded flag: at most one half-open probe may be in flight.
    half_open_claimed: AtomicBool,
    /// Bounded success/failure history for the percentage-based rule.
    history: Mutex<VecDeque<bool>>,
}

impl CircuitBreakerState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            opened_at_millis: AtomicU64::new(0),
            half_open_claimed: AtomicBool::new(false),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Force back to `CLOSED` and clear all counters and history.
    pub fn reset(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Release);
        self.opened_at_millis.store(0, Ordering::Release);
        self.half_open_claimed.store(false, Ordering::Release);
        self.history.lock().expect("breaker history mutex poisoned").clear();
    }

    pub fn current_state(&self) -> CircuitState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Whether a call against this breaker would be admitted right now:
    /// true in `CLOSED`/`HALF_OPEN`, and in `OPEN` once `cooldown_ms` has
    /// elapsed since the trip — the same lazy-recovery condition
    /// `try_acquire` itself evaluates, exposed so callers that only hold a
    /// snapshot (e.g. a multi-endpoint fast-path check) don't mistake a
    /// probe-eligible `OPEN` breaker for one that can never recover.
    pub(crate) fn permits_call(&self, cooldown_ms: u64, now_millis: u64) -> bool {
        match self.current_state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = self.opened_at_millis.load(Ordering::Acquire);
                now_millis.saturating_sub(opened_at) >= cooldown_ms
            }
        }
    }

    fn record(&self, success: bool) {
        let mut history = self.history.lock().expect("breaker history mutex poisoned");
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(success);
    }

    fn failure_rate(&self) -> (usize, f64) {
        let history = self.history.lock().expect("breaker history mutex poisoned");
        let total = history.len();
        if total == 0 {
            return (0, 0.0);
        }
        let failures = history.iter().filter(|s| !**s).count();
        (total, failures as f64 / total as f64 * 100.0)
    }
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a call with failure accounting and admission control.
///
/// `try_acquire` is the admission check (pipeline step 3 in the
/// orchestrator); `on_success`/`on_failure` feed the outcome back in once
/// the call has resolved. The two are deliberately separate methods rather
/// than a single `execute()` so the orchestrator can interleave rate
/// limiting, pooling, and endpoint selection in between.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: Arc<CircuitBreakerState>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    label: String,
    broadcaster: Broadcaster,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(CircuitBreakerState::new()),
            config,
            clock,
            label: String::new(),
            broadcaster: Broadcaster::none(),
        }
    }

    /// Build a breaker that shares state with an existing handle, e.g. one
    /// already registered in a [`crate::CircuitBreakerRegistry`].
    pub fn with_shared_state(state: Arc<CircuitBreakerState>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { state, config, clock, label: String::new(), broadcaster: Broadcaster::none() }
    }

    /// Attach an endpoint label and a [`Broadcaster`] so state transitions
    /// emit [`Event`]s. Additive — breakers built without this emit
    /// nothing, at zero cost.
    pub fn with_telemetry(mut self, label: impl Into<String>, broadcaster: Broadcaster) -> Self {
        self.label = label.into();
        self.broadcaster = broadcaster;
        self
    }

    /// The exposed operation timeout, if the breaker's config sets one.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.config.operation_timeout()
    }

    pub fn state_handle(&self) -> Arc<CircuitBreakerState> {
        self.state.clone()
    }

    pub fn current_state(&self) -> CircuitState {
        self.state.current_state()
    }

    /// Admission check. Performs the lazy `OPEN` → `HALF_OPEN` transition
    /// when the cooldown has elapsed, and enforces the single-probe
    /// guarantee while `HALF_OPEN`.
    pub fn try_acquire(&self) -> Result<(), CallError> {
        match self.state.current_state() {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => {
                if self
                    .state
                    .half_open_claimed
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Ok(())
                } else {
                    Err(CallError::HalfOpenProbeActive)
                }
            }
            CircuitState::Open => {
                let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
                let elapsed_ms = self.clock.now_millis().saturating_sub(opened_at);
                let cooldown_ms = self.config.cooldown_period().as_millis() as u64;

                if elapsed_ms < cooldown_ms {
                    return Err(CallError::CircuitOpen {
                        failure_count: self.state.consecutive_failures.load(Ordering::Acquire),
                        open_duration: Duration::from_millis(elapsed_ms),
                    });
                }

                if self
                    .state
                    .state
                    .compare_exchange(STATE_OPEN, STATE_HALF_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.state.half_open_claimed.store(true, Ordering::Release);
                    self.state.consecutive_successes.store(0, Ordering::Release);
                    self.broadcaster.emit(Event::CircuitHalfOpen { endpoint_id: self.label.clone() });
                    Ok(())
                } else {
                    // Another thread won the race and is already the probe.
                    Err(CallError::HalfOpenProbeActive)
                }
            }
        }
    }

    /// Record a successful call. In `HALF_OPEN`, closes the circuit once
    /// `success_threshold` consecutive successes have landed; a single
    /// success is not sufficient unless the threshold is 1.
    pub fn on_success(&self) {
        self.state.record(true);
        match self.state.current_state() {
            CircuitState::Closed => {
                self.state.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.state.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.state.state.store(STATE_CLOSED, Ordering::Release);
                    self.state.consecutive_failures.store(0, Ordering::Release);
                    self.state.consecutive_successes.store(0, Ordering::Release);
                    self.state.half_open_claimed.store(false, Ordering::Release);
                    self.broadcaster.emit(Event::CircuitClosed { endpoint_id: self.label.clone() });
                } else {
                    // This probe resolved without closing the circuit; release
                    // the claim so the next call becomes the next sequential
                    // probe instead of being rejected as if one were still in
                    // flight.
                    self.state.half_open_claimed.store(false, Ordering::Release);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call, classified by [`ErrorKind`]. Only infrastructure
    /// failures (per [`ErrorKind::is_infrastructure`]) advance the counters;
    /// business errors pass through without affecting breaker state.
    pub fn on_failure(&self, kind: ErrorKind) {
        if !kind.is_infrastructure() {
            return;
        }
        self.state.record(false);

        match self.state.current_state() {
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Closed => {
                let failures = self.state.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.trip();
                    return;
                }
                if let (Some(volume_threshold), Some(error_threshold_percentage)) =
                    (self.config.volume_threshold, self.config.error_threshold_percentage)
                {
                    let (total, rate) = self.state.failure_rate();
                    if total >= volume_threshold && rate >= error_threshold_percentage {
                        self.trip();
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
        self.state.consecutive_successes.store(0, Ordering::Release);
        self.state.half_open_claimed.store(false, Ordering::Release);
        self.state.state.store(STATE_OPEN, Ordering::Release);
        self.broadcaster.emit(Event::CircuitOpened {
            endpoint_id: self.label.clone(),
            failure_count: self.state.consecutive_failures.load(Ordering::Acquire),
        });
    }

    /// Force the circuit open regardless of counters.
    pub fn open(&self) {
        self.trip();
    }

    /// Force the circuit closed, clearing failure accounting.
    pub fn close(&self) {
        self.state.state.store(STATE_CLOSED, Ordering::Release);
        self.state.consecutive_failures.store(0, Ordering::Release);
        self.state.consecutive_successes.store(0, Ordering::Release);
        self.state.half_open_claimed.store(false, Ordering::Release);
    }

    /// Full reset: `CLOSED`, all counters and history cleared.
    pub fn reset(&self) {
        self.state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn breaker(failure_threshold: usize, success_threshold: usize, cooldown_ms: u64) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig {
            failure_threshold,
            success_threshold,
            cooldown_period_ms: cooldown_ms,
            volume_threshold: None,
            error_threshold_percentage: None,
            operation_timeout_ms: None,
        };
        (CircuitBreaker::new(config, clock.clone()), clock)
    }

    #[test]
    fn starts_closed_and_admits_calls() {
        let (cb, _clock) = breaker(3, 1, 1000);
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn opens_after_consecutive_failure_threshold() {
        let (cb, _clock) = breaker(3, 1, 1000);
        for _ in 0..2 {
            cb.try_acquire().unwrap();
            cb.on_failure(ErrorKind::Timeout);
        }
        assert_eq!(cb.current_state(), CircuitState::Closed);
        cb.try_acquire().unwrap();
        cb.on_failure(ErrorKind::Timeout);
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failure_count_while_closed() {
        let (cb, _clock) = breaker(3, 1, 1000);
        cb.on_failure(ErrorKind::Timeout);
        cb.on_failure(ErrorKind::Timeout);
        cb.on_success();
        cb.on_failure(ErrorKind::Timeout);
        cb.on_failure(ErrorKind::Timeout);
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn business_errors_never_trip_the_breaker() {
        let (cb, _clock) = breaker(1, 1, 1000);
        for _ in 0..10 {
            cb.on_failure(ErrorKind::Business);
        }
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn stays_open_until_cooldown_elapses_then_admits_one_probe() {
        let (cb, clock) = breaker(1, 1, 1000);
        cb.on_failure(ErrorKind::Timeout);
        assert_eq!(cb.current_state(), CircuitState::Open);

        let err = cb.try_acquire().unwrap_err();
        assert!(err.is_circuit_open());

        clock.advance(999);
        assert!(cb.try_acquire().unwrap_err().is_circuit_open());

        clock.advance(1);
        assert!(cb.try_acquire().is_ok());
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);
    }

    #[test]
    fn only_one_half_open_probe_is_admitted_at_a_time() {
        let (cb, clock) = breaker(1, 1, 1000);
        cb.on_failure(ErrorKind::Timeout);
        clock.advance(1000);

        assert!(cb.try_acquire().is_ok());
        let second = cb.try_acquire().unwrap_err();
        assert!(second.is_half_open_probe_active());
    }

    #[test]
    fn half_open_requires_success_threshold_consecutive_successes_to_close() {
        let (cb, clock) = breaker(1, 2, 1000);
        cb.on_failure(ErrorKind::Timeout);
        clock.advance(1000);

        cb.try_acquire().unwrap();
        cb.on_success();
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);

        // A probe that doesn't close the circuit releases the claim, so the
        // next call is admitted as the next sequential probe.
        cb.try_acquire().unwrap();
        cb.on_success();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let (cb, clock) = breaker(1, 1, 1000);
        cb.on_failure(ErrorKind::Timeout);
        clock.advance(1000);
        cb.try_acquire().unwrap();
        cb.on_failure(ErrorKind::Timeout);
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[test]
    fn percentage_rule_opens_independent_of_consecutive_threshold() {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig {
            failure_threshold: 1000,
            success_threshold: 1,
            cooldown_period_ms: 1000,
            volume_threshold: Some(10),
            error_threshold_percentage: Some(50.0),
            operation_timeout_ms: None,
        };
        let cb = CircuitBreaker::new(config, clock);
        for _ in 0..4 {
            cb.on_success();
        }
        for _ in 0..6 {
            cb.on_failure(ErrorKind::Timeout);
        }
        assert_eq!(cb.current_state(), CircuitState::Open);
    }

    #[test]
    fn manual_open_and_close_bypass_counters() {
        let (cb, _clock) = breaker(5, 1, 1000);
        cb.open();
        assert_eq!(cb.current_state(), CircuitState::Open);
        cb.close();
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn reset_clears_history_used_by_percentage_rule() {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig {
            failure_threshold: 1000,
            success_threshold: 1,
            cooldown_period_ms: 1000,
            volume_threshold: Some(2),
            error_threshold_percentage: Some(1.0),
            operation_timeout_ms: None,
        };
        let cb = CircuitBreaker::new(config, clock);
        cb.on_failure(ErrorKind::Timeout);
        cb.on_failure(ErrorKind::Timeout);
        assert_eq!(cb.current_state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.current_state(), CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }
}
