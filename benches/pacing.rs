//! Benchmarks for the schedule calculator
//!
//! The admission planner replans every extant campaign of an owner on each
//! create, so `plan_schedule` sits on the request path.

use chrono::{TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use drip::pacing::{default_campaign_tz, plan_schedule};
use drip::policy::{BusinessHoursStrategy, MinuteOfDay, PolicyConfig};
use std::hint::black_box;

fn bench_plan_schedule(c: &mut Criterion) {
    let tz = default_campaign_tz();
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();

    let plain = PolicyConfig {
        min_interval: 30,
        max_interval: 40,
        ..PolicyConfig::default()
    };
    let windowed = PolicyConfig {
        min_interval: 30,
        max_interval: 40,
        use_batching: true,
        batch_size: 25,
        batch_pause_min: 120,
        batch_pause_max: 300,
        business_hours_strategy: BusinessHoursStrategy::Pause,
        pause_at: Some(MinuteOfDay::parse("18:00").expect("valid time")),
        resume_at: Some(MinuteOfDay::parse("08:00").expect("valid time")),
        ..PolicyConfig::default()
    };

    let mut group = c.benchmark_group("plan_schedule");
    for n in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("plain", n), &n, |b, &n| {
            b.iter(|| plan_schedule(black_box(&plain), black_box(start), n, tz));
        });
        group.bench_with_input(BenchmarkId::new("batched_windowed", n), &n, |b, &n| {
            b.iter(|| plan_schedule(black_box(&windowed), black_box(start), n, tz));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan_schedule);
criterion_main!(benches);
