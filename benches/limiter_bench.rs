//! Throughput of the sliding-window limiter's admission paths.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fetcharr_core::core::SlidingWindowLimiter;

fn bench_check(c: &mut Criterion) {
    let limiter = SlidingWindowLimiter::new(1000, Duration::from_secs(1));
    c.bench_function("limiter_check", |b| {
        b.iter(|| black_box(limiter.check()));
    });
}

fn bench_allow(c: &mut Criterion) {
    // Large budget so the hot path stays on the grant branch.
    let limiter = SlidingWindowLimiter::new(u32::MAX, Duration::from_secs(3600));
    c.bench_function("limiter_allow", |b| {
        b.iter(|| black_box(limiter.allow()));
    });
}

fn bench_allow_denied(c: &mut Criterion) {
    let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(3600));
    limiter.allow_force();
    c.bench_function("limiter_allow_denied", |b| {
        b.iter(|| black_box(limiter.allow()));
    });
}

criterion_group!(
    benches,
    bench_check,
    bench_allow,
    bench_allow_denied
);
criterion_main!(benches);
