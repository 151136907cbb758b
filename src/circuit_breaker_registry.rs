//! Per-endpoint circuit breaker registry.
//!
//! The orchestrator keeps one [`CircuitBreaker`] per configured endpoint id
//! rather than one global breaker, so a single flaky upstream doesn't trip
//! admission for the whole pool. The registry owns the shared
//! [`CircuitBreakerState`] per id and hands out cheap [`CircuitBreaker`]
//! handles that all reference it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::telemetry::Broadcaster;

#[derive(Clone, Debug)]
struct Entry {
    state: Arc<CircuitBreakerState>,
}

/// Registry of circuit breakers keyed by endpoint id.
#[derive(Clone, Debug)]
pub struct CircuitBreakerRegistry {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), config, clock, broadcaster: Broadcaster::none() }
    }

    /// Attach a [`Broadcaster`] so every breaker handed out from here on
    /// emits circuit state transitions. Additive, applies to breakers
    /// fetched after the call.
    pub fn with_telemetry(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Get (or lazily create) the breaker for `endpoint_id`.
    pub fn get_or_create(&self, endpoint_id: &str) -> CircuitBreaker {
        let mut map = self.inner.lock().expect("circuit breaker registry mutex poisoned");
        let entry = map
            .entry(endpoint_id.to_string())
            .or_insert_with(|| Entry { state: Arc::new(CircuitBreakerState::new()) });
        CircuitBreaker::with_shared_state(entry.state.clone(), self.config.clone(), self.clock.clone())
            .with_telemetry(endpoint_id, self.broadcaster.clone())
    }

    /// Reset a single endpoint's breaker, if registered.
    pub fn reset(&self, endpoint_id: &str) -> Result<(), String> {
        let map = self.inner.lock().expect("circuit breaker registry mutex poisoned");
        match map.get(endpoint_id) {
            Some(entry) => {
                entry.state.reset();
                Ok(())
            }
            None => Err(format!("no circuit breaker registered for endpoint {endpoint_id}")),
        }
    }

    /// Whether at least one registered endpoint would currently admit a
    /// call. Used as the orchestrator's fast-path short circuit (pipeline
    /// step 3): if every endpoint's breaker is `OPEN` *and* still within
    /// its cooldown, there is no point acquiring a connection or selecting
    /// an endpoint at all. A breaker that is `OPEN` but past its cooldown
    /// still permits a call here — it's the probe candidate, and the lazy
    /// `OPEN` → `HALF_OPEN` transition only happens inside
    /// `CircuitBreaker::try_acquire`, further down the pipeline.
    pub fn any_permits_call(&self) -> bool {
        let map = self.inner.lock().expect("circuit breaker registry mutex poisoned");
        if map.is_empty() {
            return true;
        }
        let cooldown_ms = self.config.cooldown_period().as_millis() as u64;
        let now = self.clock.now_millis();
        map.values().any(|entry| entry.state.permits_call(cooldown_ms, now))
    }

    /// Snapshot of every registered endpoint's breaker state, sorted by id.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let map = self.inner.lock().expect("circuit breaker registry mutex poisoned");
        let mut entries: Vec<(String, CircuitState)> =
            map.iter().map(|(id, entry)| (id.clone(), entry.state.current_state())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;

    fn registry() -> CircuitBreakerRegistry {
        let config = BreakerConfig { failure_threshold: 1, ..BreakerConfig::default() };
        CircuitBreakerRegistry::new(config, Arc::new(ManualClock::new()))
    }

    fn registry_with_clock(cooldown_ms: u64) -> (CircuitBreakerRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = BreakerConfig { failure_threshold: 1, cooldown_period_ms: cooldown_ms, ..BreakerConfig::default() };
        (CircuitBreakerRegistry::new(config, clock.clone()), clock)
    }

    #[test]
    fn get_or_create_returns_a_stable_handle_per_id() {
        let registry = registry();
        let a1 = registry.get_or_create("a");
        a1.on_failure(ErrorKind::Timeout);
        let a2 = registry.get_or_create("a");
        assert_eq!(a2.current_state(), CircuitState::Open);
    }

    #[test]
    fn distinct_ids_are_independent() {
        let registry = registry();
        registry.get_or_create("a").on_failure(ErrorKind::Timeout);
        assert_eq!(registry.get_or_create("a").current_state(), CircuitState::Open);
        assert_eq!(registry.get_or_create("b").current_state(), CircuitState::Closed);
    }

    #[test]
    fn any_permits_call_is_true_when_registry_is_empty() {
        assert!(registry().any_permits_call());
    }

    #[test]
    fn any_permits_call_is_false_only_when_every_breaker_is_open() {
        let registry = registry();
        registry.get_or_create("a").on_failure(ErrorKind::Timeout);
        assert!(registry.any_permits_call());
        registry.get_or_create("b").on_failure(ErrorKind::Timeout);
        assert!(!registry.any_permits_call());
    }

    #[test]
    fn any_permits_call_recovers_once_the_sole_open_breakers_cooldown_elapses() {
        let (registry, clock) = registry_with_clock(1000);
        registry.get_or_create("only").on_failure(ErrorKind::Timeout);
        assert!(!registry.any_permits_call(), "still within cooldown, no breaker should permit a call");

        clock.advance(999);
        assert!(!registry.any_permits_call());

        clock.advance(1);
        assert!(
            registry.any_permits_call(),
            "once cooldown elapses the sole OPEN breaker must become the probe candidate"
        );
    }

    #[test]
    fn reset_clears_a_single_endpoint() {
        let registry = registry();
        registry.get_or_create("a").on_failure(ErrorKind::Timeout);
        assert!(registry.reset("a").is_ok());
        assert_eq!(registry.get_or_create("a").current_state(), CircuitState::Closed);
        assert!(registry.reset("missing").is_err());
    }

    #[test]
    fn snapshot_is_sorted_by_id() {
        let registry = registry();
        registry.get_or_create("b");
        registry.get_or_create("a");
        let snap = registry.snapshot();
        assert_eq!(snap[0].0, "a");
        assert_eq!(snap[1].0, "b");
    }
}
