use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relaywire::config::BreakerConfig;
use relaywire::{CircuitBreaker, ErrorKind, MonotonicClock};
use std::sync::Arc;
use std::time::Duration;

fn closed_path_admission(c: &mut Criterion) {
    let config = BreakerConfig { failure_threshold: 10, cooldown_period_ms: 30_000, ..BreakerConfig::default() };
    let breaker = CircuitBreaker::new(config, Arc::new(MonotonicClock::default()));

    c.bench_function("circuit_breaker_closed_admit_and_record_success", |b| {
        b.iter(|| {
            black_box(breaker.try_acquire()).unwrap();
            breaker.on_success();
        });
    });
}

fn open_path_fast_rejection(c: &mut Criterion) {
    let config = BreakerConfig { failure_threshold: 1, cooldown_period_ms: 30_000, ..BreakerConfig::default() };
    let breaker = CircuitBreaker::new(config, Arc::new(MonotonicClock::default()));
    breaker.on_failure(ErrorKind::Timeout);

    c.bench_function("circuit_breaker_open_fast_reject", |b| {
        b.iter(|| {
            let _ = black_box(breaker.try_acquire());
        });
    });
}

fn failure_accounting_under_the_percentage_rule(c: &mut Criterion) {
    let config = BreakerConfig {
        failure_threshold: 1_000_000,
        volume_threshold: Some(100),
        error_threshold_percentage: Some(95.0),
        cooldown_period_ms: Duration::from_secs(30).as_millis() as u64,
        ..BreakerConfig::default()
    };
    let breaker = CircuitBreaker::new(config, Arc::new(MonotonicClock::default()));

    c.bench_function("circuit_breaker_mixed_success_failure_recording", |b| {
        let mut i: u64 = 0;
        b.iter(|| {
            i = i.wrapping_add(1);
            if i % 10 == 0 {
                breaker.on_failure(black_box(ErrorKind::Timeout));
            } else {
                breaker.on_success();
            }
        });
    });
}

criterion_group!(
    benches,
    closed_path_admission,
    open_path_fast_rejection,
    failure_accounting_under_the_percentage_rule
);
criterion_main!(benches);
