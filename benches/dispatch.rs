//! Performance benchmarks for the channel pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use medimind_realtime::{
    ChangeEvent, ChangeFilter, ChannelPool, ColumnFilter, MemoryTransport, PoolConfig,
    Subscription, SubscriptionOptions, ThrottleConfig, ThrottledInvoker,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn create_pool() -> (Arc<MemoryTransport>, Arc<ChannelPool<MemoryTransport>>) {
    let transport = Arc::new(MemoryTransport::new());
    let pool = Arc::new(ChannelPool::new(Arc::clone(&transport), PoolConfig::default()).unwrap());
    (transport, pool)
}

/// Benchmark fan-out of one event to a growing number of subscribers
fn bench_dispatch_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_fan_out");

    for subscribers in [1, 10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &n| {
                let (transport, pool) = create_pool();
                let subs: Vec<_> = (0..n)
                    .map(|_| {
                        Subscription::new(
                            Arc::clone(&pool),
                            SubscriptionOptions::new("sessions", ChangeFilter::table("sessions")),
                            |change: &ChangeEvent| {
                                black_box(change);
                            },
                        )
                        .unwrap()
                    })
                    .collect();
                let event = ChangeEvent::insert("sessions", json!({"id": 1, "user_id": 7}));

                b.iter(|| {
                    black_box(transport.publish("sessions", &event));
                });

                drop(subs);
            },
        );
    }

    group.finish();
}

/// Benchmark column filter evaluation
fn bench_column_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("column_filter");
    let row = json!({"id": 42, "status": "open", "owner_id": "u-7"});

    for expr in ["owner_id=eq.u-7", "id=gte.10", "status=in.(open,pending,closed)"] {
        let filter = ColumnFilter::parse(expr).unwrap();
        group.bench_with_input(BenchmarkId::new("expr", expr), &filter, |b, filter| {
            b.iter(|| black_box(filter.matches(&row)));
        });
    }

    group.finish();
}

/// Benchmark subscribe/unsubscribe churn on a shared topic
fn bench_subscription_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("subscription_churn");

    group.bench_function("shared_topic", |b| {
        let (_transport, pool) = create_pool();
        let _anchor = Subscription::new(
            Arc::clone(&pool),
            SubscriptionOptions::new("sessions", ChangeFilter::default()),
            |_: &ChangeEvent| {},
        )
        .unwrap();

        b.iter(|| {
            let sub = Subscription::new(
                Arc::clone(&pool),
                SubscriptionOptions::new("sessions", ChangeFilter::default()),
                |_: &ChangeEvent| {},
            )
            .unwrap();
            black_box(sub.listener_id());
        });
    });

    group.bench_function("open_close", |b| {
        let (_transport, pool) = create_pool();

        b.iter(|| {
            let listener = pool.allocate_listener_id();
            pool.add_listener("sessions", listener).unwrap();
            pool.remove_listener("sessions", listener);
        });
        pool.wait_for_pending_closes();
    });

    group.finish();
}

/// Benchmark the throttle gate on a hot caller loop
fn bench_throttle_gate(c: &mut Criterion) {
    let invoker = ThrottledInvoker::new(ThrottleConfig::with_interval(Duration::from_secs(60)), || {
        Ok::<(), String>(())
    });

    c.bench_function("throttle_try_invoke", |b| {
        b.iter(|| black_box(invoker.try_invoke().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_dispatch_fan_out,
    bench_column_filter,
    bench_subscription_churn,
    bench_throttle_gate,
);
criterion_main!(benches);
