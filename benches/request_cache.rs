use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relaywire::config::CacheConfig;
use relaywire::{CacheKey, MonotonicClock, RequestCache};
use std::sync::Arc;
use std::time::Duration;

fn ready_claim(value: u64) -> futures::future::Shared<futures::future::BoxFuture<'static, Result<u64, relaywire::CallError>>> {
    use futures::future::FutureExt;
    futures::future::ready(Ok(value)).boxed().shared()
}

fn cache_hit_lookup(c: &mut Criterion) {
    let config = CacheConfig { max_size: 10_000, default_ttl_ms: 60_000, ..CacheConfig::default() };
    let cache: RequestCache<u64> = RequestCache::new(config, Arc::new(MonotonicClock::default()));
    let key = CacheKey::new("getBalance", &serde_json::json!({ "account": "bench" }));
    cache.insert(key.clone(), 42, Duration::from_secs(60));

    c.bench_function("request_cache_hit_lookup", |b| {
        b.iter(|| {
            let _ = black_box(cache.get_or_claim(key.clone(), ready_claim(0)));
        });
    });
}

fn cache_miss_then_insert(c: &mut Criterion) {
    let config = CacheConfig { max_size: 10_000, default_ttl_ms: 60_000, ..CacheConfig::default() };
    let cache: RequestCache<u64> = RequestCache::new(config, Arc::new(MonotonicClock::default()));

    c.bench_function("request_cache_miss_insert_roundtrip", |b| {
        let mut i: u64 = 0;
        b.iter(|| {
            i = i.wrapping_add(1);
            let key = CacheKey::new("getAccountInfo", &serde_json::json!({ "i": i }));
            let _ = black_box(cache.get_or_claim(key.clone(), ready_claim(i)));
            cache.insert(key, i, Duration::from_secs(60));
        });
    });
}

fn key_derivation_from_canonicalized_params(c: &mut Criterion) {
    let params = serde_json::json!({
        "account": "4Nd1mATUwn3vZwpaqhN5bXmP4n4p3m2gE3cvTBXEVBk",
        "commitment": "confirmed",
        "encoding": "jsonParsed",
    });

    c.bench_function("request_cache_key_derivation", |b| {
        b.iter(|| {
            let _ = black_box(CacheKey::new("getAccountInfo", black_box(&params)));
        });
    });
}

criterion_group!(benches, cache_hit_lookup, cache_miss_then_insert, key_derivation_from_canonicalized_params);
criterion_main!(benches);
