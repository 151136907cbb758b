//! Named configuration presets for common deployment shapes.
//!
//! One function per shape, each a const-documented bundle of component
//! configs instead of a hand-assembled [`OrchestratorConfig`]. A preset
//! produces data (a config) rather than a wrapped service, since this
//! crate's orchestrator is a concrete struct rather than a layered stack.

use crate::config::{BreakerConfig, CacheConfig, OrchestratorConfig, PoolConfig, RateLimiterConfig, SelectorConfig};

const DEFAULT_RATE_LIMIT_RPC: f64 = 50.0;
const DEFAULT_WINDOW_MS_RPC: u64 = 1000;

const DEFAULT_FAILURE_THRESHOLD_RPC: usize = 10;
const DEFAULT_SUCCESS_THRESHOLD_RPC: usize = 2;
const DEFAULT_COOLDOWN_MS_RPC: u64 = 30_000;

const DEFAULT_MAX_SOCKETS_RPC: usize = 100;
const DEFAULT_MAX_SOCKETS_PER_HOST_RPC: usize = 20;

const DEFAULT_CACHE_TTL_MS_RPC: u64 = 15_000;
const DEFAULT_CACHE_SIZE_RPC: usize = 10_000;

/// Public JSON-RPC endpoint pool under high read load: aggressive caching,
/// a generous rate limit, and a breaker tuned for many concurrent
/// consumers rather than a single client.
///
/// **Included:** rate limit 50 req/s with 1.5x burst, breaker opens after
/// 10 consecutive failures with a 30s cooldown, 100 sockets / 20 per host,
/// coalescing cache with a 15s TTL.
pub fn public_rpc_pool() -> OrchestratorConfig {
    OrchestratorConfig {
        rate: RateLimiterConfig::new(DEFAULT_RATE_LIMIT_RPC, DEFAULT_WINDOW_MS_RPC),
        breaker: BreakerConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD_RPC,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD_RPC,
            cooldown_period_ms: DEFAULT_COOLDOWN_MS_RPC,
            volume_threshold: Some(20),
            error_threshold_percentage: Some(50.0),
            operation_timeout_ms: Some(10_000),
        },
        pool: PoolConfig {
            max_sockets: DEFAULT_MAX_SOCKETS_RPC,
            max_sockets_per_host: DEFAULT_MAX_SOCKETS_PER_HOST_RPC,
            ..PoolConfig::default()
        },
        selector: SelectorConfig::default(),
        cache: CacheConfig {
            max_size: DEFAULT_CACHE_SIZE_RPC,
            default_ttl_ms: DEFAULT_CACHE_TTL_MS_RPC,
            ..CacheConfig::default()
        },
    }
}

const DEFAULT_RATE_LIMIT_PRIVATE: f64 = 200.0;
const DEFAULT_WINDOW_MS_PRIVATE: u64 = 1000;
const DEFAULT_FAILURE_THRESHOLD_PRIVATE: usize = 5;
const DEFAULT_COOLDOWN_MS_PRIVATE: u64 = 10_000;

/// A privately operated node the caller trusts and controls: looser rate
/// limiting, a breaker that trips fast on the assumption there's no load
/// balancer in front of it, and a short cache TTL since state there
/// changes quickly (balances, nonces).
///
/// **NO percentage-based opening** — with a single trusted upstream,
/// consecutive-failure tripping is sufficient and avoids false positives
/// from bursty but ultimately-healthy traffic.
pub fn private_node() -> OrchestratorConfig {
    OrchestratorConfig {
        rate: RateLimiterConfig::new(DEFAULT_RATE_LIMIT_PRIVATE, DEFAULT_WINDOW_MS_PRIVATE),
        breaker: BreakerConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD_PRIVATE,
            success_threshold: 1,
            cooldown_period_ms: DEFAULT_COOLDOWN_MS_PRIVATE,
            volume_threshold: None,
            error_threshold_percentage: None,
            operation_timeout_ms: Some(5_000),
        },
        pool: PoolConfig { max_sockets: 32, max_sockets_per_host: 32, ..PoolConfig::default() },
        selector: SelectorConfig::default(),
        cache: CacheConfig { default_ttl_ms: 2_000, max_size: 2_000, ..CacheConfig::default() },
    }
}

const DEFAULT_RATE_LIMIT_BATCH: f64 = 500.0;
const DEFAULT_WINDOW_MS_BATCH: u64 = 1000;

/// Bulk/backfill workloads: a high rate limit and large pool for
/// many concurrent `batch_call` requests, but no caching — batch jobs
/// rarely repeat the same request twice.
pub fn batch_ingestion() -> OrchestratorConfig {
    OrchestratorConfig {
        rate: RateLimiterConfig::new(DEFAULT_RATE_LIMIT_BATCH, DEFAULT_WINDOW_MS_BATCH),
        breaker: BreakerConfig {
            failure_threshold: 20,
            success_threshold: 3,
            cooldown_period_ms: 15_000,
            volume_threshold: Some(50),
            error_threshold_percentage: Some(40.0),
            operation_timeout_ms: Some(20_000),
        },
        pool: PoolConfig { max_sockets: 256, max_sockets_per_host: 64, ..PoolConfig::default() },
        selector: SelectorConfig::default(),
        cache: CacheConfig { coalesce_requests: false, max_size: 0, default_ttl_ms: 0, ..CacheConfig::default() },
    }
}
