//! Endpoint selector (§4.4): health-aware load balancing across a fixed set
//! of configured upstreams.
//!
//! Tracks per-upstream consecutive failure counts and a recovery cooldown
//! to decide eligibility, then picks among the eligible set. Round-robin,
//! weighted, least-latency, and random strategies are all built in the
//! same atomics-over-a-shared-vec style rather than reaching for
//! `dashmap` — the endpoint list is small and rarely mutated, so a plain
//! `Vec` behind a read path of atomics is cheaper.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::{EndpointConfig, SelectorConfig, SelectorStrategy};
use crate::error::CallError;
use crate::telemetry::{Broadcaster, Event};

/// Coarse health classification derived from consecutive failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

struct EndpointState {
    id: String,
    url: String,
    weight: f64,
    consecutive_failures: AtomicU32,
    last_failure_millis: AtomicU64,
    /// Exponential moving average latency in milliseconds; `u64::MAX`
    /// means "no samples yet".
    avg_latency_ms: AtomicU64,
    /// Smooth weighted round-robin accumulator (Nginx-style), stored as
    /// fixed-point milli-units so it stays an integer atomic.
    current_weight_milli: AtomicU64,
}

const NO_LATENCY_SAMPLE: u64 = u64::MAX;

/// The endpoint chosen for a call, along with the scheme/host the
/// connection pool needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEndpoint {
    pub id: String,
    pub url: String,
}

/// Picks among a fixed set of configured endpoints using a configurable
/// strategy, skipping endpoints that are currently unhealthy and not yet
/// eligible for recovery.
pub struct EndpointSelector {
    strategy: SelectorStrategy,
    recovery_time_ms: u64,
    failure_threshold: u32,
    endpoints: Vec<Arc<EndpointState>>,
    round_robin_counter: Mutex<usize>,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
}

impl EndpointSelector {
    pub fn new(config: SelectorConfig, clock: Arc<dyn Clock>) -> Self {
        let endpoints = config
            .endpoints
            .iter()
            .map(|e: &EndpointConfig| {
                Arc::new(EndpointState {
                    id: e.id.clone(),
                    url: e.url.clone(),
                    weight: e.weight,
                    consecutive_failures: AtomicU32::new(0),
                    last_failure_millis: AtomicU64::new(0),
                    avg_latency_ms: AtomicU64::new(NO_LATENCY_SAMPLE),
                    current_weight_milli: AtomicU64::new(0),
                })
            })
            .collect();

        Self {
            strategy: config.strategy,
            recovery_time_ms: config.recovery_time_ms,
            failure_threshold: config.failure_threshold,
            endpoints,
            round_robin_counter: Mutex::new(0),
            clock,
            broadcaster: Broadcaster::none(),
        }
    }

    /// Attach a [`Broadcaster`] so health transitions emit [`Event`]s.
    pub fn with_telemetry(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    fn health_of(&self, endpoint: &EndpointState) -> HealthState {
        let failures = endpoint.consecutive_failures.load(Ordering::Acquire);
        if failures == 0 {
            HealthState::Healthy
        } else if failures < self.failure_threshold {
            HealthState::Degraded
        } else {
            HealthState::Unhealthy
        }
    }

    fn is_eligible(&self, endpoint: &EndpointState) -> bool {
        match self.health_of(endpoint) {
            HealthState::Healthy | HealthState::Degraded => true,
            HealthState::Unhealthy => {
                let last_failure = endpoint.last_failure_millis.load(Ordering::Acquire);
                self.clock.now_millis().saturating_sub(last_failure) >= self.recovery_time_ms
            }
        }
    }

    fn eligible_endpoints(&self) -> Vec<&Arc<EndpointState>> {
        self.endpoints.iter().filter(|e| self.is_eligible(e)).collect()
    }

    /// Choose an endpoint per the configured strategy. Ties (weighted,
    /// least-latency) break toward the lower endpoint id for determinism.
    pub fn select(&self) -> Result<SelectedEndpoint, CallError> {
        let eligible = self.eligible_endpoints();
        if eligible.is_empty() {
            return Err(CallError::NoEndpointAvailable);
        }

        let chosen = match self.strategy {
            SelectorStrategy::RoundRobin => self.select_round_robin(&eligible),
            SelectorStrategy::Weighted => self.select_weighted(&eligible),
            SelectorStrategy::LeastLatency => self.select_least_latency(&eligible),
            SelectorStrategy::Random => self.select_random(&eligible),
        };

        Ok(SelectedEndpoint { id: chosen.id.clone(), url: chosen.url.clone() })
    }

    fn select_round_robin<'a>(&self, eligible: &[&'a Arc<EndpointState>]) -> &'a Arc<EndpointState> {
        let mut counter = self.round_robin_counter.lock().expect("round robin counter mutex poisoned");
        let idx = *counter % eligible.len();
        *counter = counter.wrapping_add(1);
        eligible[idx]
    }

    /// Smooth weighted round-robin: each call, every eligible endpoint's
    /// accumulator grows by its weight; the endpoint with the largest
    /// accumulator is chosen and its accumulator is reduced by the total
    /// weight. Ties break on the lower id. Converges to each endpoint being
    /// picked in proportion to its configured weight.
    fn select_weighted<'a>(&self, eligible: &[&'a Arc<EndpointState>]) -> &'a Arc<EndpointState> {
        const FIXED_POINT: f64 = 1000.0;
        let total_weight_milli: u64 = eligible.iter().map(|e| (e.weight * FIXED_POINT) as u64).sum();

        let mut best: Option<&Arc<EndpointState>> = None;
        let mut best_weight = 0u64;
        for endpoint in eligible {
            let new_weight = endpoint.current_weight_milli.fetch_add(
                (endpoint.weight * FIXED_POINT) as u64,
                Ordering::AcqRel,
            ) + (endpoint.weight * FIXED_POINT) as u64;

            let is_better = match best {
                None => true,
                Some(_) if new_weight > best_weight => true,
                Some(current) if new_weight == best_weight && endpoint.id < current.id => true,
                _ => false,
            };
            if is_better {
                best = Some(endpoint);
                best_weight = new_weight;
            }
        }

        let winner = best.expect("eligible set is non-empty");
        winner.current_weight_milli.fetch_sub(total_weight_milli, Ordering::AcqRel);
        winner
    }

    fn select_least_latency<'a>(&self, eligible: &[&'a Arc<EndpointState>]) -> &'a Arc<EndpointState> {
        eligible
            .iter()
            .min_by(|a, b| {
                let latency_a = a.avg_latency_ms.load(Ordering::Acquire);
                let latency_b = b.avg_latency_ms.load(Ordering::Acquire);
                latency_a.cmp(&latency_b).then_with(|| a.id.cmp(&b.id))
            })
            .copied()
            .expect("eligible set is non-empty")
    }

    fn select_random<'a>(&self, eligible: &[&'a Arc<EndpointState>]) -> &'a Arc<EndpointState> {
        use rand::Rng;
        let idx = rand::rng().random_range(0..eligible.len());
        eligible[idx]
    }

    /// Feed back a successful call: clears the failure streak and updates
    /// the latency estimate with an exponential moving average (alpha =
    /// 0.2, matching typical health-check smoothing).
    pub fn record_success(&self, endpoint_id: &str, latency_ms: u64) {
        let Some(endpoint) = self.endpoints.iter().find(|e| e.id == endpoint_id) else { return };
        let previous_failures = endpoint.consecutive_failures.swap(0, Ordering::AcqRel);
        if previous_failures >= self.failure_threshold {
            self.broadcaster.emit(Event::EndpointRecovered { endpoint_id: endpoint_id.to_string() });
        }

        let previous = endpoint.avg_latency_ms.load(Ordering::Acquire);
        let updated = if previous == NO_LATENCY_SAMPLE {
            latency_ms
        } else {
            ((previous as f64) * 0.8 + (latency_ms as f64) * 0.2) as u64
        };
        endpoint.avg_latency_ms.store(updated, Ordering::Release);
    }

    /// Feed back a failed call: advances the consecutive-failure streak
    /// and stamps the recovery clock.
    pub fn record_failure(&self, endpoint_id: &str) {
        let Some(endpoint) = self.endpoints.iter().find(|e| e.id == endpoint_id) else { return };
        let failures = endpoint.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        endpoint.last_failure_millis.store(self.clock.now_millis(), Ordering::Release);
        if failures == self.failure_threshold {
            self.broadcaster.emit(Event::EndpointMarkedUnhealthy {
                endpoint_id: endpoint_id.to_string(),
                consecutive_failures: failures,
            });
        }
    }

    pub fn health_snapshot(&self) -> Vec<(String, HealthState)> {
        self.endpoints.iter().map(|e| (e.id.clone(), self.health_of(e))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn selector(strategy: SelectorStrategy, endpoints: &[(&str, &str, f64)]) -> (EndpointSelector, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = SelectorConfig {
            strategy,
            endpoints: endpoints
                .iter()
                .map(|(id, url, weight)| EndpointConfig::new(*id, *url).with_weight(*weight))
                .collect(),
            failure_threshold: 3,
            recovery_time_ms: 1000,
            health_check_interval_ms: 500,
        };
        (EndpointSelector::new(config, clock.clone()), clock)
    }

    #[test]
    fn no_endpoints_configured_is_unavailable() {
        let (selector, _clock) = selector(SelectorStrategy::RoundRobin, &[]);
        assert!(selector.select().unwrap_err().is_no_endpoint_available());
    }

    #[test]
    fn round_robin_cycles_through_all_endpoints() {
        let (selector, _clock) = selector(SelectorStrategy::RoundRobin, &[("a", "u1", 1.0), ("b", "u2", 1.0), ("c", "u3", 1.0)]);
        let picks: Vec<String> = (0..6).map(|_| selector.select().unwrap().id).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn consecutive_failures_past_threshold_make_endpoint_ineligible() {
        let (selector, _clock) = selector(SelectorStrategy::RoundRobin, &[("a", "u1", 1.0), ("b", "u2", 1.0)]);
        selector.record_failure("a");
        selector.record_failure("a");
        selector.record_failure("a");
        let picks: Vec<String> = (0..4).map(|_| selector.select().unwrap().id).collect();
        assert!(picks.iter().all(|id| id == "b"));
    }

    #[test]
    fn unhealthy_endpoint_recovers_after_recovery_time() {
        let (selector, clock) = selector(SelectorStrategy::RoundRobin, &[("a", "u1", 1.0), ("b", "u2", 1.0)]);
        selector.record_failure("a");
        selector.record_failure("a");
        selector.record_failure("a");
        assert_eq!(selector.select().unwrap().id, "b");

        clock.advance(1000);
        let health = selector.health_snapshot();
        assert!(health.iter().any(|(id, _)| id == "a"));
        // Eligible again; round robin may pick either, but must not error.
        assert!(selector.select().is_ok());
    }

    #[test]
    fn weighted_strategy_favors_higher_weight_over_many_picks() {
        let (selector, _clock) = selector(SelectorStrategy::Weighted, &[("a", "u1", 3.0), ("b", "u2", 1.0)]);
        let mut a_count = 0;
        let mut b_count = 0;
        for _ in 0..8 {
            match selector.select().unwrap().id.as_str() {
                "a" => a_count += 1,
                "b" => b_count += 1,
                _ => unreachable!(),
            }
        }
        assert_eq!(a_count, 6);
        assert_eq!(b_count, 2);
    }

    #[test]
    fn least_latency_picks_the_lowest_recorded_average() {
        let (selector, _clock) = selector(SelectorStrategy::LeastLatency, &[("a", "u1", 1.0), ("b", "u2", 1.0)]);
        selector.record_success("a", 100);
        selector.record_success("b", 10);
        assert_eq!(selector.select().unwrap().id, "b");
    }

    #[test]
    fn least_latency_breaks_ties_on_lower_id() {
        let (selector, _clock) = selector(SelectorStrategy::LeastLatency, &[("b", "u2", 1.0), ("a", "u1", 1.0)]);
        assert_eq!(selector.select().unwrap().id, "a");
    }

    #[test]
    fn random_strategy_only_ever_picks_eligible_endpoints() {
        let (selector, _clock) = selector(SelectorStrategy::Random, &[("a", "u1", 1.0), ("b", "u2", 1.0)]);
        selector.record_failure("a");
        selector.record_failure("a");
        selector.record_failure("a");
        for _ in 0..20 {
            assert_eq!(selector.select().unwrap().id, "b");
        }
    }

    #[test]
    fn success_after_failures_resets_the_streak() {
        let (selector, _clock) = selector(SelectorStrategy::RoundRobin, &[("a", "u1", 1.0)]);
        selector.record_failure("a");
        selector.record_failure("a");
        selector.record_success("a", 5);
        let health = selector.health_snapshot();
        assert!(matches!(health[0].1, HealthState::Healthy));
    }
}
