//! Fan-out benchmarks for the broadcast hub.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pager_core::{BroadcastHub, HubConfig, Topic, Validator};
use pager_protocol::MessageEvent;
use serde_json::json;

/// Benchmark publish + drain across a growing number of subscribers.
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");

    for subscribers in [1usize, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &n| {
                let hub = BroadcastHub::with_config(HubConfig {
                    subscriber_buffer: 16,
                });
                let mut subs: Vec<_> = (0..n)
                    .map(|_| hub.subscribe(Topic::MessageNew).unwrap())
                    .collect();

                b.iter(|| {
                    let report = hub.publish(
                        Topic::MessageNew,
                        MessageEvent::new(black_box("Hello"), Some("c1".to_string())),
                    );
                    for sub in &mut subs {
                        let _ = sub.try_recv();
                    }
                    report
                });
            },
        );
    }

    group.finish();
}

/// Benchmark subscribe/unsubscribe churn.
fn bench_subscription_churn(c: &mut Criterion) {
    let hub = BroadcastHub::new();
    let _background: Vec<_> = (0..100)
        .map(|_| hub.subscribe(Topic::MessageNew).unwrap())
        .collect();

    c.bench_function("subscribe_drop", |b| {
        b.iter(|| drop(hub.subscribe(black_box(Topic::MessageNew)).unwrap()))
    });
}

/// Benchmark validation of a worst-case body.
fn bench_validate(c: &mut Criterion) {
    let validator = Validator::default();
    let body = json!({"message": "<>\"'/".repeat(10), "correlationId": "x".repeat(100)});

    c.bench_function("validate_escape_heavy", |b| {
        b.iter(|| validator.validate(Some(black_box(&body))))
    });
}

criterion_group!(
    benches,
    bench_publish_fanout,
    bench_subscription_churn,
    bench_validate
);
criterion_main!(benches);
