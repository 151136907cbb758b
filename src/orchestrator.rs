//! The orchestrator (§6): composes the rate limiter, circuit breaker
//! registry, connection pool, endpoint selector, and request cache into the
//! single `call`/`batch_call` entry point callers actually use.
//!
//! This component needs an explicit, order-sensitive pipeline rather than
//! layered middleware (cache population has to happen strictly after a
//! successful fetch, and feedback has to reach both the selector and the
//! breaker), so it is written as a straight-line `async fn` instead of a
//! stack of composed services, since the eight steps don't fit a generic
//! middleware chain's data dependencies.
//!
//! Every component handle is held behind one `Arc<Inner>` so the whole
//! orchestrator is a cheap `Clone`, the same cheap-handle-over-shared-state
//! shape used throughout this crate. That is also what makes
//! cache coalescing cancellation-safe (§5): the in-flight fetch for a miss
//! is driven by a detached `tokio::spawn`, not by whichever caller's future
//! happens to be polling it, so a cancelled originator never starves
//! waiters still coalesced onto the same claim.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::circuit_breaker_registry::CircuitBreakerRegistry;
use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::connection_pool::ConnectionPool;
use crate::endpoint_selector::{EndpointSelector, SelectedEndpoint};
use crate::error::{CallError, ErrorKind, UpstreamFailure};
use crate::metrics::{MetricsCollector, Snapshot};
use crate::request_cache::{CacheKey, Lookup, RequestCache};
use crate::telemetry::{Broadcaster, Event, EventListener};
use crate::token_bucket::TokenBucket;

/// The caller-supplied transport. The orchestrator never constructs HTTP
/// requests itself — it only decides *when* and *to which endpoint* to
/// dispatch one.
#[async_trait::async_trait]
pub trait Wire: Send + Sync {
    async fn send(&self, endpoint: &SelectedEndpoint, method: &str, params: &Value) -> Result<Value, UpstreamFailure>;
}

/// Per-call overrides (§6.2).
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides [`crate::config::CacheConfig::default_ttl_ms`] for this
    /// call's cache entry.
    pub cache_ttl: Option<Duration>,
    /// Skip the cache entirely — neither read nor populate it.
    pub skip_cache: bool,
    /// Overrides the breaker's `operationTimeout` for this call only. If
    /// neither this nor the breaker config sets a timeout, the call runs
    /// until the wire resolves.
    pub deadline: Option<Duration>,
    /// Use this exact string as the cache key instead of the one derived
    /// from canonicalized `(method, params)`. Useful when two distinct
    /// request shapes should share one cache entry, or vice versa.
    pub cache_key: Option<String>,
    /// Scheduling priority hint, reserved for a future admission-ordering
    /// policy. Accepted today so callers can start passing it; it does not
    /// yet change dispatch order.
    pub priority: Option<u8>,
}

fn host_of(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let host_and_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    host_and_port.to_string()
}

fn explicit_cache_key(raw: &str) -> CacheKey {
    let digest = Sha256::digest(format!("explicit:{raw}").as_bytes());
    CacheKey::new("__explicit__", &serde_json::json!(format!("{digest:x}")))
}

struct Inner<W: Wire + 'static> {
    rate: TokenBucket,
    breakers: CircuitBreakerRegistry,
    pool: ConnectionPool,
    selector: EndpointSelector,
    cache: RequestCache<Value>,
    metrics: MetricsCollector,
    cache_default_ttl: Duration,
    wire: Arc<W>,
    clock: Arc<dyn Clock>,
    broadcaster: Broadcaster,
}

/// Composes the five components into the call pipeline described in §6.
///
/// Cheap to clone: every field lives behind one `Arc<Inner>`.
pub struct Orchestrator<W: Wire + 'static> {
    inner: Arc<Inner<W>>,
}

impl<W: Wire + 'static> Clone for Orchestrator<W> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<W: Wire + 'static> Orchestrator<W> {
    pub fn new(config: OrchestratorConfig, wire: Arc<W>, clock: Arc<dyn Clock>) -> Self {
        Self::with_listeners(config, wire, clock, Vec::new())
    }

    /// Build an orchestrator that emits [`Event`]s to the given listeners
    /// as the rate limiter, breakers, selector, and cache observe state
    /// changes (§9).
    pub fn with_listeners(
        config: OrchestratorConfig,
        wire: Arc<W>,
        clock: Arc<dyn Clock>,
        listeners: Vec<Arc<dyn EventListener>>,
    ) -> Self {
        let broadcaster = Broadcaster::new(listeners);
        let cache_default_ttl = config.cache.default_ttl();
        let inner = Inner {
            rate: TokenBucket::new(config.rate, clock.clone()),
            breakers: CircuitBreakerRegistry::new(config.breaker, clock.clone()).with_telemetry(broadcaster.clone()),
            pool: ConnectionPool::new(config.pool),
            selector: EndpointSelector::new(config.selector, clock.clone()).with_telemetry(broadcaster.clone()),
            cache: RequestCache::new(config.cache, clock.clone()),
            metrics: MetricsCollector::new(),
            cache_default_ttl,
            wire,
            clock,
            broadcaster,
        };
        Self { inner: Arc::new(inner) }
    }

    /// The eight-step call pipeline:
    /// 1. rate limit  2. circuit fast-path  3. cache lookup  4. pool
    /// (global)  5. endpoint selection  6. pool (per-host bind)  7. breaker
    /// admission  8. dispatch, then feed the outcome back to the cache,
    /// selector, and breaker.
    ///
    /// On a cache miss the fetch is driven by a detached task: dropping
    /// this call's future (cancellation) never interrupts the fetch while
    /// other callers are still coalesced onto it, and the cache is
    /// populated unconditionally once the fetch resolves, regardless of
    /// whether the originator is still waiting.
    pub async fn call(&self, method: &str, params: Value, options: CallOptions) -> Result<Value, CallError> {
        if !self.inner.rate.consume(1.0) {
            self.inner.metrics.record_rate_limited();
            self.inner.broadcaster.emit(Event::RateLimited);
            return Err(CallError::RateLimited);
        }

        if !self.inner.breakers.any_permits_call() {
            self.inner.metrics.record_circuit_rejection();
            return Err(CallError::CircuitOpen { failure_count: 0, open_duration: Duration::ZERO });
        }

        let cache_key = if options.skip_cache {
            None
        } else if let Some(raw) = &options.cache_key {
            Some(explicit_cache_key(raw))
        } else {
            Some(CacheKey::new(method, &params))
        };

        if let Some(key) = &cache_key {
            let claim = self.spawn_claim(method.to_string(), params.clone(), key.clone(), options.deadline, options.cache_ttl);
            return match self.inner.cache.get_or_claim(key.clone(), claim.clone()) {
                Lookup::Hit(value) => {
                    self.inner.metrics.record_cache_hit();
                    self.inner.broadcaster.emit(Event::CacheHit { method: method.to_string() });
                    Ok(value)
                }
                Lookup::Coalesced(shared) => {
                    self.inner.metrics.record_cache_hit();
                    self.inner.broadcaster.emit(Event::CacheHit { method: method.to_string() });
                    shared.await
                }
                Lookup::Miss => {
                    self.inner.metrics.record_cache_miss();
                    self.inner.broadcaster.emit(Event::CacheMiss { method: method.to_string() });
                    claim.await
                }
            };
        }

        Self::dispatch(&self.inner, method, &params, options.deadline).await
    }

    /// Build the boxed, shared future that drives a cache miss: a
    /// `tokio::spawn`ed fetch, so it keeps running independent of whichever
    /// caller's poll first triggered it. First poll detaches; subsequent
    /// drops of the `Shared` clone do not abort the task.
    fn spawn_claim(
        &self,
        method: String,
        params: Value,
        key: CacheKey,
        deadline: Option<Duration>,
        cache_ttl: Option<Duration>,
    ) -> futures::future::Shared<BoxFuture<'static, Result<Value, CallError>>> {
        let inner = self.inner.clone();
        let ttl = cache_ttl.unwrap_or(inner.cache_default_ttl);
        let fut: BoxFuture<'static, Result<Value, CallError>> = async move {
            let handle = tokio::spawn(async move {
                let outcome = Self::dispatch(&inner, &method, &params, deadline).await;
                match &outcome {
                    Ok(value) => inner.cache.insert(key.clone(), value.clone(), ttl),
                    Err(_) => inner.cache.abandon(&key),
                }
                outcome
            });
            handle.await.unwrap_or(Err(CallError::Cancelled))
        }
        .boxed();
        fut.shared()
    }

    async fn dispatch(inner: &Arc<Inner<W>>, method: &str, params: &Value, deadline: Option<Duration>) -> Result<Value, CallError> {
        let global_slot = inner.pool.acquire_global()?;
        let endpoint = inner.selector.select()?;
        let host = host_of(&endpoint.url);

        let _handle = inner.pool.bind_host(global_slot, &host)?;

        let breaker = inner.breakers.get_or_create(&endpoint.id);
        breaker.try_acquire()?;

        let limit = deadline.or_else(|| breaker.operation_timeout());
        let started = Instant::now();
        let result = match limit {
            Some(limit) => match tokio::time::timeout(limit, inner.wire.send(&endpoint, method, params)).await {
                Ok(result) => result,
                Err(_) => {
                    let elapsed = started.elapsed();
                    breaker.on_failure(ErrorKind::Timeout);
                    inner.selector.record_failure(&endpoint.id);
                    inner.metrics.record_failure(&endpoint.id);
                    inner.broadcaster.emit(Event::CallFailed {
                        endpoint_id: endpoint.id.clone(),
                        method: method.to_string(),
                        kind: ErrorKind::Timeout,
                    });
                    return Err(CallError::Timeout { elapsed, limit });
                }
            },
            None => inner.wire.send(&endpoint, method, params).await,
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                breaker.on_success();
                inner.selector.record_success(&endpoint.id, latency_ms);
                inner.metrics.record_success(&endpoint.id, latency_ms);
                inner.broadcaster.emit(Event::CallSucceeded {
                    endpoint_id: endpoint.id.clone(),
                    method: method.to_string(),
                    latency_ms,
                });
                Ok(value)
            }
            Err(failure) => {
                let kind = failure.kind;
                breaker.on_failure(kind);
                if kind.is_infrastructure() {
                    inner.selector.record_failure(&endpoint.id);
                }
                inner.metrics.record_failure(&endpoint.id);
                inner.broadcaster.emit(Event::CallFailed {
                    endpoint_id: endpoint.id.clone(),
                    method: method.to_string(),
                    kind,
                });

                Err(match kind {
                    ErrorKind::Timeout => CallError::Timeout {
                        elapsed: Duration::from_millis(latency_ms),
                        limit: limit.unwrap_or(Duration::from_millis(latency_ms)),
                    },
                    ErrorKind::Cancelled => CallError::Cancelled,
                    ErrorKind::Business => {
                        CallError::BusinessError { endpoint_id: endpoint.id.clone(), source: failure }
                    }
                    _ => CallError::UpstreamError { endpoint_id: endpoint.id.clone(), source: failure },
                })
            }
        }
    }

    /// Dispatch many calls concurrently, preserving input order in the
    /// output, bounded to avoid a caller's batch saturating the pool or
    /// rate limiter all at once.
    pub async fn batch_call(
        &self,
        requests: Vec<(String, Value, CallOptions)>,
        max_concurrency: usize,
    ) -> Vec<Result<Value, CallError>> {
        use futures::stream::{self, StreamExt};

        let this = self.clone();
        stream::iter(requests)
            .map(move |(method, params, options)| {
                let this = this.clone();
                async move { this.call(&method, params, options).await }
            })
            .buffered(max_concurrency.max(1))
            .collect()
            .await
    }

    pub fn metrics(&self) -> Snapshot {
        self.inner.metrics.snapshot()
    }

    /// Releases no background resources today (detached fetch tasks run to
    /// completion and drop their own `Arc` clones on exit), but gives
    /// callers a stable point to call before dropping the orchestrator as
    /// the component set grows.
    pub fn shutdown(&self) {}
}
