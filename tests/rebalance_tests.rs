//! The diagnostic rebalance utility: it evens out pathological
//! distributions, keeps every key findable, and makes progress under
//! concurrent traffic.

use paratree::{HashFunction, ParaTree, ParaTreeBuilder, RoutingStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// A tree whose static-direct routing piles everything onto shard 0.
fn lopsided_tree() -> ParaTree<u64, u64> {
    let tree = ParaTreeBuilder::new()
        .num_shards(8)
        .unwrap()
        .routing_strategy(RoutingStrategy::StaticHash)
        .hash_function(HashFunction::Direct)
        .build::<u64, u64>()
        .unwrap();
    for i in 0u64..800 {
        tree.insert(i * 8, i);
    }
    tree
}

#[test]
fn test_should_rebalance_flags_concentration() {
    let tree = lopsided_tree();
    assert!(tree.should_rebalance(2.0));

    let even = ParaTree::<u64, u64>::with_shards(8).unwrap();
    for k in 0u64..800 {
        even.insert(k, k);
    }
    assert!(!even.should_rebalance(2.0));
    // Empty tree never wants a rebalance.
    let empty = ParaTree::<u64, u64>::with_shards(8).unwrap();
    assert!(!empty.should_rebalance(2.0));
}

#[test]
fn test_rebalance_evens_out_and_preserves_keys() {
    let tree = lopsided_tree();
    assert_eq!(tree.stats().shard_sizes[0], 800);

    tree.rebalance_shards(1.2);

    let stats = tree.stats();
    assert_eq!(stats.size, 800, "rebalance must not lose or invent keys");
    assert!(
        stats.balance_score >= 0.70,
        "balance: {} sizes: {:?}",
        stats.balance_score,
        stats.shard_sizes
    );

    // Every key is still findable and holds its value, wherever it went.
    for i in 0u64..800 {
        assert_eq!(*tree.get(&(i * 8)).unwrap(), i, "lost key {}", i * 8);
    }
    // And removable.
    for i in 0u64..800 {
        assert!(tree.remove(&(i * 8)).is_some());
    }
    assert!(tree.is_empty());
}

#[test]
fn test_rebalance_is_idempotent_when_even() {
    let tree = ParaTree::<u64, u64>::with_shards(8).unwrap();
    for k in 0u64..1000 {
        tree.insert(k, k);
    }
    let before = tree.stats().shard_sizes;
    tree.rebalance_shards(2.0);
    // Already under the cap: nothing moved.
    assert_eq!(tree.stats().shard_sizes, before);
}

#[test]
fn test_rebalance_single_shard_is_a_noop() {
    let tree = ParaTree::<u64, u64>::with_shards(1).unwrap();
    for k in 0u64..100 {
        tree.insert(k, k);
    }
    tree.rebalance_shards(1.1);
    assert_eq!(tree.len(), 100);
}

#[test]
fn test_progress_under_rebalance_and_traffic() {
    // Concurrent workers keep operating while a maintenance thread
    // repeatedly rebalances; everything terminates and the books match.
    let tree = Arc::new(lopsided_tree());
    let stop = Arc::new(AtomicBool::new(false));

    let maintenance = {
        let tree = Arc::clone(&tree);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                tree.rebalance_shards(1.5);
                thread::yield_now();
            }
        })
    };

    let mut workers = vec![];
    for t in 0..4u64 {
        let tree = Arc::clone(&tree);
        workers.push(thread::spawn(move || {
            let base = 1_000_000 + t * 10_000;
            for i in 0..5_000 {
                let key = base + i;
                tree.insert(key, key);
                assert!(tree.contains(&key), "key {key} vanished");
                if i % 2 == 0 {
                    tree.remove(&key);
                }
            }
        }));
    }

    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    maintenance.join().unwrap();

    // 800 attack keys plus the surviving odd worker keys.
    assert_eq!(tree.len(), 800 + 4 * 2500);
    tree.rebalance_shards(1.5);
    assert_eq!(tree.len(), 800 + 4 * 2500);
}
