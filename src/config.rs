//! Configuration structs for every component, enumerated per the component
//! design. These are plain, `serde`-deserializable data — loading them from
//! TOML/JSON/env is an external collaborator's job; the core only defines
//! the shape and the defaults.

use std::time::Duration;

/// Rate limiter configuration. `max_burst` defaults to `1.5 * rate_limit`
/// when left unset via [`RateLimiterConfig::new`].
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RateLimiterConfig {
    /// Tokens added per `window_ms`.
    pub rate_limit: f64,
    /// Refill granularity in milliseconds.
    pub window_ms: u64,
    /// Ceiling on accumulated tokens.
    pub max_burst: f64,
}

impl RateLimiterConfig {
    pub fn new(rate_limit: f64, window_ms: u64) -> Self {
        Self { rate_limit, window_ms, max_burst: rate_limit * 1.5 }
    }

    pub fn with_max_burst(mut self, max_burst: f64) -> Self {
        self.max_burst = max_burst;
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(50.0, 1000)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct BreakerConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub cooldown_period_ms: u64,
    /// Minimum call volume (within the diagnostic ring buffer) before the
    /// percentage rule is evaluated.
    pub volume_threshold: Option<usize>,
    /// Opens the circuit when the failure percentage over the last
    /// `volume_threshold` calls crosses this value, independent of the
    /// consecutive-failure rule.
    pub error_threshold_percentage: Option<f64>,
    pub operation_timeout_ms: Option<u64>,
}

impl BreakerConfig {
    pub fn cooldown_period(&self) -> Duration {
        Duration::from_millis(self.cooldown_period_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown_period_ms: 30_000,
            volume_threshold: None,
            error_threshold_percentage: None,
            operation_timeout_ms: None,
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct PoolConfig {
    pub max_sockets: usize,
    pub max_sockets_per_host: usize,
    pub keep_alive: bool,
    pub keep_alive_ms: u64,
    pub timeout_ms: u64,
    pub max_free_sockets: Option<usize>,
}

impl PoolConfig {
    pub fn keep_alive_window(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sockets: 64,
            max_sockets_per_host: 16,
            keep_alive: true,
            keep_alive_ms: 60_000,
            timeout_ms: 10_000,
            max_free_sockets: Some(16),
        }
    }
}

/// Load-balancing policy for [`crate::EndpointSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorStrategy {
    RoundRobin,
    Weighted,
    LeastLatency,
    Random,
}

/// A single configured upstream target.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct EndpointConfig {
    pub id: String,
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl EndpointConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), url: url.into(), weight: 1.0 }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Endpoint selector configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SelectorConfig {
    pub strategy: SelectorStrategy,
    pub endpoints: Vec<EndpointConfig>,
    pub failure_threshold: u32,
    pub recovery_time_ms: u64,
    pub health_check_interval_ms: u64,
}

impl SelectorConfig {
    pub fn recovery_time(&self) -> Duration {
        Duration::from_millis(self.recovery_time_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            strategy: SelectorStrategy::RoundRobin,
            endpoints: Vec::new(),
            failure_threshold: 3,
            recovery_time_ms: 30_000,
            health_check_interval_ms: 5_000,
        }
    }
}

/// Request cache configuration.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_ms: u64,
    pub cleanup_interval_ms: u64,
    pub coalesce_requests: bool,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 10_000, default_ttl_ms: 15_000, cleanup_interval_ms: 60_000, coalesce_requests: true }
    }
}

/// The full set of options recognized by the orchestrator (§6), assembled
/// from the per-component configs above.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct OrchestratorConfig {
    pub rate: RateLimiterConfig,
    pub breaker: BreakerConfig,
    pub pool: PoolConfig,
    pub selector: SelectorConfig,
    pub cache: CacheConfig,
}
