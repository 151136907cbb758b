//! Typed event notifications (§9): a fixed enum of state changes plus a
//! small trait of listeners supplied at construction, rather than a
//! dynamic string-keyed emitter.
//!
//! Splits "what happened" (the [`Event`] enum) from "who's watching"
//! ([`EventListener`] implementors: [`TracingListener`], [`MemoryListener`]).
//! Events are plain notifications fired synchronously at the point of
//! state change rather than flowing through a layered service stack with
//! its own backpressure, so the sink contract here is a direct trait
//! method instead of a `Service`.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::ErrorKind;

/// A state change or outcome worth surfacing to an observer.
///
/// This is the crate's entire event vocabulary — every listener match
/// should be exhaustive against it.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A call was denied admission by the token bucket.
    RateLimited,
    /// An endpoint's circuit breaker transitioned `CLOSED`/`HALF_OPEN` → `OPEN`.
    CircuitOpened { endpoint_id: String, failure_count: usize },
    /// An endpoint's breaker transitioned `OPEN` → `HALF_OPEN` and admitted a probe.
    CircuitHalfOpen { endpoint_id: String },
    /// An endpoint's breaker transitioned `HALF_OPEN` → `CLOSED`.
    CircuitClosed { endpoint_id: String },
    /// An endpoint crossed the consecutive-failure threshold into `Unhealthy`.
    EndpointMarkedUnhealthy { endpoint_id: String, consecutive_failures: u32 },
    /// An endpoint that had been unhealthy recorded a success.
    EndpointRecovered { endpoint_id: String },
    /// A cache lookup found a live, unexpired value.
    CacheHit { method: String },
    /// A cache lookup found nothing and the caller proceeded to fetch.
    CacheMiss { method: String },
    /// A dispatched call returned a value.
    CallSucceeded { endpoint_id: String, method: String, latency_ms: u64 },
    /// A dispatched call failed, classified by [`ErrorKind`].
    CallFailed { endpoint_id: String, method: String, kind: ErrorKind },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::RateLimited => write!(f, "rate limited"),
            Event::CircuitOpened { endpoint_id, failure_count } => {
                write!(f, "circuit opened for {endpoint_id} ({failure_count} failures)")
            }
            Event::CircuitHalfOpen { endpoint_id } => write!(f, "circuit half-open for {endpoint_id}"),
            Event::CircuitClosed { endpoint_id } => write!(f, "circuit closed for {endpoint_id}"),
            Event::EndpointMarkedUnhealthy { endpoint_id, consecutive_failures } => {
                write!(f, "{endpoint_id} marked unhealthy ({consecutive_failures} consecutive failures)")
            }
            Event::EndpointRecovered { endpoint_id } => write!(f, "{endpoint_id} recovered"),
            Event::CacheHit { method } => write!(f, "cache hit for {method}"),
            Event::CacheMiss { method } => write!(f, "cache miss for {method}"),
            Event::CallSucceeded { endpoint_id, method, latency_ms } => {
                write!(f, "{method} succeeded via {endpoint_id} in {latency_ms}ms")
            }
            Event::CallFailed { endpoint_id, method, kind } => {
                write!(f, "{method} failed via {endpoint_id}: {kind}")
            }
        }
    }
}

/// A listener supplied at construction of the orchestrator (and, through
/// it, the breaker registry and endpoint selector). Invoked synchronously
/// at the point of the state change it describes — implementations must
/// not block or panic.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Logs every event through `tracing`. State degradations (`CircuitOpened`,
/// `EndpointMarkedUnhealthy`, `CallFailed`) log at `warn`; recoveries and
/// routine admission/cache events log at `info`/`debug`. Never logs request
/// parameters, only method names, endpoint ids, and counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn on_event(&self, event: &Event) {
        match event {
            Event::RateLimited => tracing::info!("rate limited"),
            Event::CircuitOpened { endpoint_id, failure_count } => {
                tracing::warn!(endpoint_id = %endpoint_id, failure_count, "circuit opened")
            }
            Event::CircuitHalfOpen { endpoint_id } => {
                tracing::info!(endpoint_id = %endpoint_id, "circuit half-open, probing")
            }
            Event::CircuitClosed { endpoint_id } => {
                tracing::info!(endpoint_id = %endpoint_id, "circuit closed")
            }
            Event::EndpointMarkedUnhealthy { endpoint_id, consecutive_failures } => {
                tracing::warn!(endpoint_id = %endpoint_id, consecutive_failures, "endpoint marked unhealthy")
            }
            Event::EndpointRecovered { endpoint_id } => {
                tracing::info!(endpoint_id = %endpoint_id, "endpoint recovered")
            }
            Event::CacheHit { method } => tracing::debug!(method = %method, "cache hit"),
            Event::CacheMiss { method } => tracing::debug!(method = %method, "cache miss"),
            Event::CallSucceeded { endpoint_id, method, latency_ms } => {
                tracing::debug!(endpoint_id = %endpoint_id, method = %method, latency_ms, "call succeeded")
            }
            Event::CallFailed { endpoint_id, method, kind } => {
                tracing::warn!(endpoint_id = %endpoint_id, method = %method, kind = %kind, "call failed")
            }
        }
    }
}

/// Records every event in memory, in order. Useful for tests and for
/// sinks that poll rather than subscribe to a push-based listener.
#[derive(Debug, Default)]
pub struct MemoryListener {
    events: Mutex<Vec<Event>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("memory listener mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("memory listener mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventListener for MemoryListener {
    fn on_event(&self, event: &Event) {
        self.events.lock().expect("memory listener mutex poisoned").push(event.clone());
    }
}

/// Fans one event out to every registered listener. Cheap to clone —
/// held by the orchestrator and threaded into the breaker registry and
/// endpoint selector so they can emit at the exact point of transition.
#[derive(Clone, Default)]
pub struct Broadcaster {
    listeners: Arc<Vec<Arc<dyn EventListener>>>,
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster").field("listener_count", &self.listeners.len()).finish()
    }
}

impl Broadcaster {
    pub fn new(listeners: Vec<Arc<dyn EventListener>>) -> Self {
        Self { listeners: Arc::new(listeners) }
    }

    /// Broadcast to zero listeners; every component defaults to this so
    /// telemetry is strictly opt-in.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        for listener in self.listeners.iter() {
            listener.on_event(&event);
        }
    }
}
