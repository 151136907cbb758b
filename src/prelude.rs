//! Convenient re-exports for common relaywire types.
pub use crate::{
    config::{
        BreakerConfig, CacheConfig, EndpointConfig, OrchestratorConfig, PoolConfig,
        RateLimiterConfig, SelectorConfig, SelectorStrategy,
    },
    profile,
    Broadcaster, CacheKey, CallError, CallOptions, CircuitBreaker, CircuitBreakerRegistry,
    CircuitState, Clock, ConnectionPool, ErrorKind, Event, EventListener, HealthState,
    LatencyPercentiles, Lookup, ManualClock, MemoryListener, MetricsCollector, MonotonicClock,
    Orchestrator, PoolStats, RequestCache, SelectedEndpoint, Snapshot, TokenBucket,
    TracingListener, UpstreamFailure, Wire,
};
