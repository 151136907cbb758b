//! Prometheus metrics sink for `relaywire`.
//! Bring your own `prometheus::Registry`; metrics are registered once and
//! updated in place — an `IntCounterVec` of named events (driven by
//! [`relaywire::EventListener`]) plus a set of gauges refreshed from a
//! periodic [`relaywire::Snapshot`] (driven by [`PrometheusSink::observe_snapshot`]).

use prometheus::{GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry};
use relaywire::{Event, EventListener, Snapshot};
use std::sync::Arc;

#[derive(Clone)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    events_total: IntCounterVec,
    calls_total: IntGaugeVec,
    latency_ms: GaugeVec,
}

impl PrometheusSink {
    /// Creates a sink and registers its metrics into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric name conflicts with one already
    /// registered.
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();

        let events_total = IntCounterVec::new(
            Opts::new("relaywire_events_total", "Count of relaywire telemetry events by kind"),
            &["kind", "endpoint_id"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        let calls_total = IntGaugeVec::new(
            Opts::new("relaywire_calls_total", "Cumulative call outcomes from the latest snapshot"),
            &["outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let latency_ms = GaugeVec::new(
            Opts::new("relaywire_latency_ms", "Latency percentiles from the latest snapshot"),
            &["endpoint_id", "quantile"],
        )?;
        registry.register(Box::new(latency_ms.clone()))?;

        Ok(Self { registry, events_total, calls_total, latency_ms })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Refresh the gauge metrics from a point-in-time [`Snapshot`]. Call
    /// this on whatever cadence the scrape loop or a background task uses;
    /// it overwrites rather than accumulates, since a `Snapshot` is already
    /// cumulative from the orchestrator's own counters.
    pub fn observe_snapshot(&self, snapshot: &Snapshot) {
        self.calls_total.with_label_values(&["success"]).set(snapshot.total_successes as i64);
        self.calls_total.with_label_values(&["failure"]).set(snapshot.total_failures as i64);
        self.calls_total.with_label_values(&["rate_limited"]).set(snapshot.rate_limited as i64);
        self.calls_total.with_label_values(&["circuit_rejected"]).set(snapshot.circuit_rejections as i64);
        self.calls_total.with_label_values(&["cache_hit"]).set(snapshot.cache_hits as i64);
        self.calls_total.with_label_values(&["cache_miss"]).set(snapshot.cache_misses as i64);

        self.latency_ms.with_label_values(&["global", "p50"]).set(snapshot.latency.p50 as f64);
        self.latency_ms.with_label_values(&["global", "p95"]).set(snapshot.latency.p95 as f64);
        self.latency_ms.with_label_values(&["global", "p99"]).set(snapshot.latency.p99 as f64);

        for (endpoint_id, (percentiles, _successes, _failures)) in &snapshot.per_endpoint {
            self.latency_ms.with_label_values(&[endpoint_id, "p50"]).set(percentiles.p50 as f64);
            self.latency_ms.with_label_values(&[endpoint_id, "p95"]).set(percentiles.p95 as f64);
            self.latency_ms.with_label_values(&[endpoint_id, "p99"]).set(percentiles.p99 as f64);
        }
    }
}

impl EventListener for PrometheusSink {
    fn on_event(&self, event: &Event) {
        let (kind, endpoint_id) = match event {
            Event::RateLimited => ("rate_limited", ""),
            Event::CircuitOpened { endpoint_id, .. } => ("circuit_opened", endpoint_id.as_str()),
            Event::CircuitHalfOpen { endpoint_id } => ("circuit_half_open", endpoint_id.as_str()),
            Event::CircuitClosed { endpoint_id } => ("circuit_closed", endpoint_id.as_str()),
            Event::EndpointMarkedUnhealthy { endpoint_id, .. } => {
                ("endpoint_marked_unhealthy", endpoint_id.as_str())
            }
            Event::EndpointRecovered { endpoint_id } => ("endpoint_recovered", endpoint_id.as_str()),
            Event::CacheHit { .. } => ("cache_hit", ""),
            Event::CacheMiss { .. } => ("cache_miss", ""),
            Event::CallSucceeded { endpoint_id, .. } => ("call_succeeded", endpoint_id.as_str()),
            Event::CallFailed { endpoint_id, .. } => ("call_failed", endpoint_id.as_str()),
        };
        self.events_total.with_label_values(&[kind, endpoint_id]).inc();
    }
}
