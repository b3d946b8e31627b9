//! Reconciliation benchmarks for the message lifecycle.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pager_client::{MessageLifecycle, Outgoing};
use pager_protocol::MessageEvent;

fn in_flight(n: usize) -> (MessageLifecycle, Vec<Outgoing>) {
    let mut lifecycle = MessageLifecycle::default();
    let outgoing = (0..n)
        .map(|i| lifecycle.submit(&format!("message {i}")).unwrap())
        .collect();
    (lifecycle, outgoing)
}

/// Benchmark acknowledging every in-flight message by echo.
fn bench_echo_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("echo_reconcile");

    for n in [10usize, 100, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let (lifecycle, outgoing) = in_flight(n);
                    let echoes: Vec<_> = outgoing
                        .iter()
                        .map(|o| {
                            MessageEvent::new(
                                o.request.message.clone(),
                                o.request.correlation_id.clone(),
                            )
                        })
                        .collect();
                    (lifecycle, echoes)
                },
                |(mut lifecycle, echoes)| {
                    for echo in &echoes {
                        black_box(lifecycle.apply_echo(echo));
                    }
                    lifecycle
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark derived values over a busy collection.
fn bench_derived(c: &mut Criterion) {
    let (mut lifecycle, outgoing) = in_flight(500);
    for o in outgoing.iter().step_by(2) {
        lifecycle.mark_sent(o.id).unwrap();
    }
    lifecycle.append_inbound("hi".to_string());

    c.bench_function("queued_count_500", |b| {
        b.iter(|| black_box(&lifecycle).queued_count())
    });
    c.bench_function("latest_inbound_500", |b| {
        b.iter(|| black_box(&lifecycle).latest_inbound().map(|m| m.id))
    });
}

criterion_group!(benches, bench_echo_reconcile, bench_derived);
criterion_main!(benches);
