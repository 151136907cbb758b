#![forbid(unsafe_code)]

//! # relaywire
//!
//! A resilient RPC transport chain for talking to Solana (or any JSON-RPC)
//! upstreams from a latency-sensitive trading bot: rate limiting, circuit
//! breaking, connection pooling, health-aware endpoint selection, and
//! request coalescing/caching, composed behind one [`Orchestrator`].
//!
//! ## Components
//!
//! - [`TokenBucket`] — admission control (§4.1)
//! - [`CircuitBreaker`] / [`CircuitBreakerRegistry`] — per-endpoint failure
//!   isolation (§4.2)
//! - [`ConnectionPool`] — bounded global/per-host connection admission (§4.3)
//! - [`EndpointSelector`] — health-aware load balancing (§4.4)
//! - [`RequestCache`] — TTL-bounded, single-flight result cache (§4.5)
//!
//! [`Orchestrator`] composes all five into `call`/`batch_call`.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use relaywire::{CallOptions, MonotonicClock, Orchestrator, SelectedEndpoint, UpstreamFailure, Wire};
//! use relaywire::config::{EndpointConfig, OrchestratorConfig, SelectorConfig};
//!
//! struct EchoWire;
//!
//! #[async_trait::async_trait]
//! impl Wire for EchoWire {
//!     async fn send(
//!         &self,
//!         endpoint: &SelectedEndpoint,
//!         _method: &str,
//!         _params: &serde_json::Value,
//!     ) -> Result<serde_json::Value, UpstreamFailure> {
//!         Ok(serde_json::json!({ "endpoint": endpoint.id }))
//!     }
//! }
//!
//! # async fn run() {
//! let mut config = OrchestratorConfig::default();
//! config.selector = SelectorConfig {
//!     endpoints: vec![EndpointConfig::new("primary", "https://api.mainnet-beta.solana.com")],
//!     ..SelectorConfig::default()
//! };
//!
//! let orchestrator = Orchestrator::new(config, Arc::new(EchoWire), Arc::new(MonotonicClock::default()));
//! let result = orchestrator
//!     .call("getBalance", serde_json::json!({ "account": "..." }), CallOptions::default())
//!     .await;
//! assert!(result.is_ok());
//! # }
//! ```

mod circuit_breaker;
mod circuit_breaker_registry;
mod clock;
pub mod config;
mod connection_pool;
mod endpoint_selector;
mod error;
mod metrics;
mod orchestrator;
pub mod profile;
mod request_cache;
mod telemetry;
mod token_bucket;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
pub use circuit_breaker_registry::CircuitBreakerRegistry;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use connection_pool::{ConnectionPool, GlobalSlot, Handle, PoolStats};
pub use endpoint_selector::{EndpointSelector, HealthState, SelectedEndpoint};
pub use error::{CallError, ErrorKind, UpstreamFailure};
pub use metrics::{LatencyPercentiles, MetricsCollector, Snapshot};
pub use orchestrator::{CallOptions, Orchestrator, Wire};
pub use request_cache::{CacheKey, Lookup, RequestCache};
pub use telemetry::{Broadcaster, Event, EventListener, MemoryListener, TracingListener};
pub use token_bucket::TokenBucket;

pub mod prelude;
