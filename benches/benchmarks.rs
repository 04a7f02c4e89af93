//! ParaTree benchmarks.
//!
//! Focused on lib identity: scaling by shard count, routing-strategy cost,
//! and attack absorption. Run with:
//!
//! ```bash
//! cargo bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use paratree::workload::{Adversarial, Uniform, Zipfian};
use paratree::{HashFunction, ParaTreeBuilder, RoutingStrategy};
use std::sync::Arc;
use std::thread;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for num_shards in [1, 4, 8, 16, 32] {
        group.bench_with_input(
            BenchmarkId::new("paratree", num_shards),
            &num_shards,
            |b, &num_shards| {
                let tree = ParaTreeBuilder::new()
                    .num_shards(num_shards)
                    .unwrap()
                    .build::<u64, u64>()
                    .unwrap();
                b.iter(|| {
                    for i in 0u64..1000 {
                        tree.insert(i, i);
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for num_shards in [4, 8, 32] {
        group.bench_with_input(
            BenchmarkId::new("paratree", num_shards),
            &num_shards,
            |b, &num_shards| {
                let tree = ParaTreeBuilder::new()
                    .num_shards(num_shards)
                    .unwrap()
                    .build::<u64, u64>()
                    .unwrap();
                for i in 0u64..1000 {
                    tree.insert(i, i);
                }
                b.iter(|| {
                    for i in 0u64..1000 {
                        black_box(tree.get(&i));
                    }
                });
            },
        );
    }

    group.finish();
}

/// Routing cost per strategy, uniform keys.
fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_insert");

    for (name, strategy) in [
        ("static_hash", RoutingStrategy::StaticHash),
        ("load_aware", RoutingStrategy::LoadAware),
        ("virtual_nodes", RoutingStrategy::VirtualNodes),
        ("intelligent", RoutingStrategy::Intelligent),
    ] {
        group.bench_function(name, |b| {
            let tree = ParaTreeBuilder::new()
                .num_shards(8)
                .unwrap()
                .routing_strategy(strategy)
                .build::<u64, u64>()
                .unwrap();
            let mut keys = Uniform::new(7, 0, 1_000_000);
            b.iter(|| {
                let key = keys.next().unwrap();
                tree.insert(key, key);
            });
        });
    }

    group.finish();
}

/// The stride attack against a static victim and an adaptive defender.
fn bench_adversarial(c: &mut Criterion) {
    let mut group = c.benchmark_group("adversarial_500");

    for (name, strategy) in [
        ("static_hash", RoutingStrategy::StaticHash),
        ("intelligent", RoutingStrategy::Intelligent),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let tree = ParaTreeBuilder::new()
                    .num_shards(8)
                    .unwrap()
                    .routing_strategy(strategy)
                    .hash_function(HashFunction::Direct)
                    .build::<u64, u64>()
                    .unwrap();
                for key in Adversarial::new(8, 0).take(500) {
                    tree.insert(key, key);
                }
                black_box(tree.stats().balance_score)
            });
        });
    }

    group.finish();
}

fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed");

    let num_threads = 8;
    let ops_per_thread = 5_000;

    for num_shards in [8, 32] {
        group.bench_with_input(
            BenchmarkId::new("paratree", num_shards),
            &num_shards,
            |b, &num_shards| {
                b.iter_custom(|iters| {
                    let start = std::time::Instant::now();
                    for _ in 0..iters {
                        let tree = Arc::new(
                            ParaTreeBuilder::new()
                                .num_shards(num_shards)
                                .unwrap()
                                .build::<u64, u64>()
                                .unwrap(),
                        );
                        let mut handles = vec![];

                        for thread_id in 0..num_threads {
                            let tree = Arc::clone(&tree);
                            let handle = thread::spawn(move || {
                                let seed = thread_id as u64;
                                let mut keys = Zipfian::new(seed, 100_000, 0.99);
                                for i in 0..ops_per_thread {
                                    let key = keys.next().unwrap();
                                    if i % 10 < 3 {
                                        tree.insert(key, key);
                                    } else {
                                        black_box(tree.get(&key));
                                    }
                                }
                            });
                            handles.push(handle);
                        }

                        for handle in handles {
                            handle.join().unwrap();
                        }
                    }
                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

fn bench_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_scan");

    let tree = ParaTreeBuilder::new()
        .num_shards(8)
        .unwrap()
        .build::<u64, u64>()
        .unwrap();
    for i in 0u64..100_000 {
        tree.insert(i, i);
    }

    group.bench_function("narrow", |b| {
        b.iter(|| {
            let mut sink = Vec::new();
            tree.range(&40_000, &40_100, &mut sink);
            black_box(sink.len())
        });
    });

    group.bench_function("wide", |b| {
        b.iter(|| {
            let mut sink = Vec::with_capacity(50_000);
            tree.range(&25_000, &75_000, &mut sink);
            black_box(sink.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_strategies,
    bench_adversarial,
    bench_concurrent_mixed,
    bench_range_scan
);
criterion_main!(benches);
