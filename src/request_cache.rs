//! Request cache (§4.5): a TTL-bounded, single-flight result cache keyed by
//! the canonicalized JSON-RPC request.
//!
//! The TTL-entry/age bookkeeping follows a simple insert-with-timestamp
//! shape: age computed against a configured TTL, hit/miss counters. Plain
//! TTL caches like that have no single-flight concept on their own, so the
//! coalescing behaviour here is additional: concurrent lookups
//! for the same key that all miss share one in-flight `Shared` future
//! instead of issuing duplicate upstream calls, the way `futures::Shared`
//! is used for exactly this purpose across the async Rust ecosystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::CallError;

/// A cache key derived from the canonical JSON encoding of a request,
/// hashed to a fixed-width, collision-resistant digest (256 bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `method` plus `params`, canonicalized by round-tripping through
    /// `serde_json::Value` (which sorts object keys) before hashing, so two
    /// requests that differ only in key order collide on purpose.
    pub fn new(method: &str, params: &Value) -> Self {
        let canonical = serde_json::json!({ "method": method, "params": params });
        let bytes = serde_json::to_vec(&canonical).expect("Value serialization cannot fail");
        let digest = Sha256::digest(&bytes);
        Self(format!("{digest:x}"))
    }
}

enum Slot<T> {
    Ready { value: T, inserted_at_ms: u64, ttl_ms: u64 },
    InFlight(Shared<BoxFuture<'static, Result<T, CallError>>>),
}

/// Coalescing TTL cache. Cloning is cheap; clones share the same
/// underlying table.
pub struct RequestCache<T: Clone + Send + Sync + 'static> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    table: Arc<Mutex<HashMap<CacheKey, Slot<T>>>>,
    insertion_order: Arc<Mutex<Vec<CacheKey>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> Clone for RequestCache<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            clock: self.clock.clone(),
            table: self.table.clone(),
            insertion_order: self.insertion_order.clone(),
            hits: self.hits.clone(),
            misses: self.misses.clone(),
        }
    }
}

/// What a lookup found.
pub enum Lookup<T> {
    /// A live, unexpired value.
    Hit(T),
    /// Nothing cached for this key; the caller owns the miss and should
    /// populate the cache once it has a value.
    Miss,
    /// Another caller's in-flight fetch for this key; await it instead of
    /// issuing a duplicate request.
    Coalesced(Shared<BoxFuture<'static, Result<T, CallError>>>),
}

impl<T: Clone + Send + Sync + 'static> RequestCache<T> {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            table: Arc::new(Mutex::new(HashMap::new())),
            insertion_order: Arc::new(Mutex::new(Vec::new())),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Look up `key`. On a miss, if [`CacheConfig::coalesce_requests`] is
    /// enabled, registers `in_flight` as the claim other callers should
    /// await, and returns `Miss` to this (first) caller so it proceeds to
    /// fetch. Subsequent callers for the same key see `Coalesced` instead.
    pub fn get_or_claim(
        &self,
        key: CacheKey,
        in_flight: Shared<BoxFuture<'static, Result<T, CallError>>>,
    ) -> Lookup<T> {
        let mut table = self.table.lock().expect("request cache table mutex poisoned");
        match table.get(&key) {
            Some(Slot::Ready { value, inserted_at_ms, ttl_ms }) => {
                let age = self.clock.now_millis().saturating_sub(*inserted_at_ms);
                if age < *ttl_ms {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Lookup::Hit(value.clone());
                }
                table.remove(&key);
            }
            Some(Slot::InFlight(shared)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Lookup::Coalesced(shared.clone());
            }
            None => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        if self.config.coalesce_requests {
            table.insert(key, Slot::InFlight(in_flight));
        }
        Lookup::Miss
    }

    /// Populate the cache with a freshly fetched value, replacing any
    /// in-flight claim for the same key. Evicts the oldest insertion if the
    /// table is at capacity.
    pub fn insert(&self, key: CacheKey, value: T, ttl: std::time::Duration) {
        let mut table = self.table.lock().expect("request cache table mutex poisoned");
        let mut order = self.insertion_order.lock().expect("request cache order mutex poisoned");

        if !table.contains_key(&key) {
            if table.len() >= self.config.max_size {
                if let Some(oldest) = order.first().cloned() {
                    table.remove(&oldest);
                    order.remove(0);
                }
            }
            order.push(key.clone());
        }

        table.insert(
            key,
            Slot::Ready { value, inserted_at_ms: self.clock.now_millis(), ttl_ms: ttl.as_millis() as u64 },
        );
    }

    /// Drop a claim without populating a value, e.g. because the fetch
    /// failed. Leaves the key absent so the next caller retries.
    pub fn abandon(&self, key: &CacheKey) {
        let mut table = self.table.lock().expect("request cache table mutex poisoned");
        if matches!(table.get(key), Some(Slot::InFlight(_))) {
            table.remove(key);
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.table.lock().expect("request cache table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use futures::future::FutureExt;
    use std::time::Duration;

    fn cache(max_size: usize, default_ttl_ms: u64) -> (RequestCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig { max_size, default_ttl_ms, cleanup_interval_ms: 60_000, coalesce_requests: true };
        (RequestCache::new(config, clock.clone()), clock)
    }

    fn ready_future(value: u32) -> Shared<BoxFuture<'static, Result<u32, CallError>>> {
        futures::future::ready(Ok(value)).boxed().shared()
    }

    #[test]
    fn same_method_and_params_produce_the_same_key_regardless_of_field_order() {
        let a = CacheKey::new("getBalance", &serde_json::json!({ "a": 1, "b": 2 }));
        let b = CacheKey::new("getBalance", &serde_json::json!({ "b": 2, "a": 1 }));
        assert_eq!(a, b);
    }

    #[test]
    fn different_params_produce_different_keys() {
        let a = CacheKey::new("getBalance", &serde_json::json!({ "account": "x" }));
        let b = CacheKey::new("getBalance", &serde_json::json!({ "account": "y" }));
        assert_ne!(a, b);
    }

    #[test]
    fn first_lookup_misses_and_populates_a_hit_for_the_second() {
        let (cache, _clock) = cache(10, 1000);
        let key = CacheKey::new("m", &Value::Null);
        assert!(matches!(cache.get_or_claim(key.clone(), ready_future(0)), Lookup::Miss));
        cache.insert(key.clone(), 42, Duration::from_millis(1000));
        assert!(matches!(cache.get_or_claim(key, ready_future(0)), Lookup::Hit(42)));
    }

    #[test]
    fn entries_expire_after_their_ttl() {
        let (cache, clock) = cache(10, 100);
        let key = CacheKey::new("m", &Value::Null);
        cache.insert(key.clone(), 1, Duration::from_millis(100));
        clock.advance(99);
        assert!(matches!(cache.get_or_claim(key.clone(), ready_future(0)), Lookup::Hit(1)));
        clock.advance(2);
        assert!(matches!(cache.get_or_claim(key, ready_future(0)), Lookup::Miss));
    }

    #[test]
    fn concurrent_miss_for_the_same_key_coalesces_onto_the_first_claim() {
        let (cache, _clock) = cache(10, 1000);
        let key = CacheKey::new("m", &Value::Null);
        let claim = ready_future(7);

        assert!(matches!(cache.get_or_claim(key.clone(), claim.clone()), Lookup::Miss));
        match cache.get_or_claim(key, ready_future(0)) {
            Lookup::Coalesced(_) => {}
            _ => panic!("expected the second caller to coalesce onto the first claim"),
        }
    }

    #[test]
    fn abandoning_a_claim_allows_the_next_caller_to_retry() {
        let (cache, _clock) = cache(10, 1000);
        let key = CacheKey::new("m", &Value::Null);
        cache.get_or_claim(key.clone(), ready_future(0));
        cache.abandon(&key);
        assert!(matches!(cache.get_or_claim(key, ready_future(0)), Lookup::Miss));
    }

    #[test]
    fn eviction_drops_the_oldest_insertion_once_at_capacity() {
        let (cache, _clock) = cache(2, 1000);
        cache.insert(CacheKey::new("a", &Value::Null), 1, Duration::from_millis(1000));
        cache.insert(CacheKey::new("b", &Value::Null), 2, Duration::from_millis(1000));
        cache.insert(CacheKey::new("c", &Value::Null), 3, Duration::from_millis(1000));
        assert_eq!(cache.len(), 2);
        assert!(matches!(
            cache.get_or_claim(CacheKey::new("a", &Value::Null), ready_future(0)),
            Lookup::Miss
        ));
    }

    #[test]
    fn hit_and_miss_counters_track_lookups() {
        let (cache, _clock) = cache(10, 1000);
        let key = CacheKey::new("m", &Value::Null);
        cache.get_or_claim(key.clone(), ready_future(0));
        cache.insert(key.clone(), 1, Duration::from_millis(1000));
        cache.get_or_claim(key, ready_future(0));
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
    }
}
