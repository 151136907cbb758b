//! Latency and outcome metrics (§10.6), aggregated per endpoint and
//! globally.
//!
//! Metrics collection is an internal concern, not an external collaborator,
//! so this follows `hdrhistogram`'s own recommended usage pattern directly:
//! one `Histogram` behind a `Mutex` per thing being measured, read out as
//! percentiles on demand. The per-endpoint/cache/pool counters are plain
//! atomics, the same style the rest of this crate uses for hot-path
//! bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use hdrhistogram::Histogram;

/// Point-in-time latency percentiles, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyPercentiles {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

struct EndpointMetrics {
    histogram: Mutex<Histogram<u64>>,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            histogram: Mutex::new(Histogram::new(3).expect("valid histogram precision")),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// Full metrics snapshot returned by [`crate::Orchestrator::metrics`].
///
/// Cheap to clone and serialize — this is the shape handed to the
/// out-of-scope monitoring/dashboard collaborator.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub rate_limited: u64,
    pub circuit_rejections: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub latency: LatencyPercentiles,
    pub per_endpoint: HashMap<String, (LatencyPercentiles, u64, u64)>,
}

/// Collects call outcomes and latencies across the whole orchestrator.
pub struct MetricsCollector {
    global_histogram: Mutex<Histogram<u64>>,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    rate_limited: AtomicU64,
    circuit_rejections: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    per_endpoint: Mutex<HashMap<String, Arc<EndpointMetrics>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            global_histogram: Mutex::new(Histogram::new(3).expect("valid histogram precision")),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            circuit_rejections: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            per_endpoint: Mutex::new(HashMap::new()),
        }
    }

    fn endpoint_entry(&self, endpoint_id: &str) -> Arc<EndpointMetrics> {
        let mut map = self.per_endpoint.lock().expect("per-endpoint metrics mutex poisoned");
        map.entry(endpoint_id.to_string()).or_insert_with(|| Arc::new(EndpointMetrics::new())).clone()
    }

    pub fn record_success(&self, endpoint_id: &str, latency_ms: u64) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        self.global_histogram
            .lock()
            .expect("global histogram mutex poisoned")
            .record(latency_ms)
            .expect("latency within histogram range");

        let entry = self.endpoint_entry(endpoint_id);
        entry.successes.fetch_add(1, Ordering::Relaxed);
        entry
            .histogram
            .lock()
            .expect("endpoint histogram mutex poisoned")
            .record(latency_ms)
            .expect("latency within histogram range");
    }

    pub fn record_failure(&self, endpoint_id: &str) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        self.endpoint_entry(endpoint_id).failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn percentiles(histogram: &Histogram<u64>) -> LatencyPercentiles {
        LatencyPercentiles {
            p50: histogram.value_at_quantile(0.50),
            p95: histogram.value_at_quantile(0.95),
            p99: histogram.value_at_quantile(0.99),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let global = Self::percentiles(&self.global_histogram.lock().expect("global histogram mutex poisoned"));

        let per_endpoint = self
            .per_endpoint
            .lock()
            .expect("per-endpoint metrics mutex poisoned")
            .iter()
            .map(|(id, metrics)| {
                let percentiles = Self::percentiles(&metrics.histogram.lock().expect("endpoint histogram mutex poisoned"));
                (
                    id.clone(),
                    (percentiles, metrics.successes.load(Ordering::Relaxed), metrics.failures.load(Ordering::Relaxed)),
                )
            })
            .collect();

        let total_successes = self.total_successes.load(Ordering::Relaxed);
        let total_failures = self.total_failures.load(Ordering::Relaxed);

        Snapshot {
            total_calls: total_successes + total_failures,
            total_successes,
            total_failures,
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            latency: global,
            per_endpoint,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
