//! Deflected keys stay findable, and the redirect index garbage collector
//! drops entries that routing has caught up with.

use paratree::{
    HashFunction, ParaTreeBuilder, RedirectIndex, RoutingStrategy,
};

/// Build a load-aware tree routed by key position, so natural shards are
/// predictable (key % num_shards).
fn load_aware_tree(num_shards: usize) -> paratree::ParaTree<u64, u64> {
    ParaTreeBuilder::new()
        .num_shards(num_shards)
        .unwrap()
        .routing_strategy(RoutingStrategy::LoadAware)
        .hash_function(HashFunction::Direct)
        .build::<u64, u64>()
        .unwrap()
}

#[test]
fn test_deflected_key_stays_findable() {
    let tree = load_aware_tree(8);

    // Saturate shard 0: multiples of 8 all route there naturally.
    for i in 0u64..1000 {
        tree.insert(i * 8, i);
    }
    tree.refresh_load_view();

    // Shard 0 is hot now; this key's natural home is shard 0 but it
    // should be deflected elsewhere.
    tree.insert(16000, 999);
    assert_eq!(*tree.get(&16000).unwrap(), 999);
    assert!(tree.contains(&16000));

    let actual = tree.shard_of(&16000).unwrap();
    assert_eq!(tree.natural_shard_of(&16000), 0);
    if actual != 0 {
        // The index explains the placement.
        assert_eq!(tree.redirect_of(&16000), Some(actual));
        assert!(tree.stats().redirect_index_size > 0);
    }
}

#[test]
fn test_update_of_deflected_key_lands_in_place() {
    let tree = load_aware_tree(8);
    for i in 0u64..1000 {
        tree.insert(i * 8, i);
    }
    tree.refresh_load_view();

    tree.insert(16000, 1);
    let home = tree.shard_of(&16000).unwrap();

    // Overwrites must not move the key or double-place it.
    tree.insert(16000, 2);
    tree.insert(16000, 3);
    assert_eq!(tree.shard_of(&16000), Some(home));
    assert_eq!(*tree.get(&16000).unwrap(), 3);

    let expected: usize = 1001;
    assert_eq!(tree.len(), expected);
}

#[test]
fn test_remove_erases_the_redirect_entry() {
    let tree = load_aware_tree(8);
    for i in 0u64..1000 {
        tree.insert(i * 8, i);
    }
    tree.refresh_load_view();

    tree.insert(16000, 7);
    let before = tree.stats().redirect_index_size;
    assert!(tree.remove(&16000).is_some());
    assert!(!tree.contains(&16000));
    assert_eq!(tree.redirect_of(&16000), None);
    if before > 0 {
        assert!(tree.stats().redirect_index_size < before);
    }
    // Removing again reports absent.
    assert!(tree.remove(&16000).is_none());
}

// Index-level GC behavior, driven through the same closure shape the
// container uses.

#[test]
fn test_gc_drops_only_tautologies() {
    let index: RedirectIndex<u64> = RedirectIndex::new();
    index.record(10, 0, 3);
    index.record(20, 1, 3);
    index.record(30, 2, 5);
    assert_eq!(index.len(), 3);

    // Routing now sends 10 and 20 to shard 3 on its own; 30 still points
    // at 2 while living in 5.
    let removed = index.gc_expired(|key| match key {
        10 | 20 => 3,
        30 => 2,
        _ => 0,
    });

    assert_eq!(removed, 2);
    assert_eq!(index.len(), 1);
    assert_eq!(index.lookup(&30), Some(5));
    assert_eq!(index.lookup(&10), None);
    assert_eq!(index.lookup(&20), None);
}

#[test]
fn test_gc_on_empty_index() {
    let index: RedirectIndex<u64> = RedirectIndex::new();
    assert_eq!(index.gc_expired(|_| 0), 0);
}

#[test]
fn test_gc_preserves_live_redirects() {
    let index: RedirectIndex<u64> = RedirectIndex::new();
    index.record(10, 0, 3);
    index.record(20, 1, 4);
    index.record(30, 2, 5);

    // Natural routing unchanged: every entry still earns its keep.
    let removed = index.gc_expired(|key| (*key % 8) as usize);
    assert_eq!(removed, 0);
    assert_eq!(index.len(), 3);
}

#[test]
fn test_gc_can_drain_the_index() {
    let index: RedirectIndex<u64> = RedirectIndex::new();
    for key in 0u64..1000 {
        index.record(key, 0, 1);
    }
    let removed = index.gc_expired(|_| 1);
    assert_eq!(removed, 1000);
    assert!(index.is_empty());
}

#[test]
fn test_gc_runs_concurrently_with_lookups() {
    use std::sync::Arc;
    use std::thread;

    let index: Arc<RedirectIndex<u64>> = Arc::new(RedirectIndex::new());
    for key in 0u64..100 {
        index.record(key, 0, (key % 8) as usize);
    }

    let gc = {
        let index = Arc::clone(&index);
        thread::spawn(move || index.gc_expired(|key| (*key % 8) as usize))
    };
    let lookups = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for key in 0u64..100 {
                let _ = index.lookup(&key);
            }
        })
    };

    let removed = gc.join().unwrap();
    lookups.join().unwrap();
    // Keys congruent to 0 mod 8 were identity placements and never
    // recorded; everything else is a tautology for this router.
    assert_eq!(removed, index_len_expected());
    assert!(index.is_empty());
}

fn index_len_expected() -> usize {
    (0u64..100).filter(|k| k % 8 != 0).count()
}

#[test]
fn test_reinsert_after_gc_and_drift_keeps_single_copy() {
    // The full sequence: deflect a key, collect its entry as a tautology,
    // let routing drift away from the shard holding it, then reinsert.
    // The reinsert must land on the existing copy and re-record its
    // entry, never place a second one.
    let tree = load_aware_tree(8);

    // Make shard 0 permanently hot: fill every shard evenly, then drain
    // all the others.
    for i in 0u64..2000 {
        tree.insert(i, i);
    }
    for i in 0u64..2000 {
        if i % 8 != 0 {
            tree.remove(&i);
        }
    }
    tree.refresh_load_view();

    // Natural shard 0 is hot and shard 1 is least loaded: the key is
    // deflected there.
    let key = 16_000u64;
    tree.insert(key, 1);
    assert_eq!(tree.shard_of(&key), Some(1));
    assert_eq!(tree.redirect_of(&key), Some(1));

    // Ballast shards 2..7 so shard 1 stays the router's target for the
    // key, which makes its entry a tautology.
    for j in 2u64..8 {
        for r in 0u64..8 {
            tree.insert(100_000 + r * 8 + j, 0);
        }
    }
    tree.refresh_load_view();
    assert_eq!(tree.gc_redirects(), 1);
    assert_eq!(tree.redirect_of(&key), None);
    // Still reachable through the router's current decision.
    assert!(tree.contains(&key));

    // Drift: pile load onto shard 1 so the router's decision for the key
    // moves elsewhere, leaving the copy in shard 1 covered by neither the
    // index nor the current routing.
    for r in 0u64..32 {
        tree.insert(200_000 + r * 8 + 1, 0);
    }
    tree.refresh_load_view();

    // Reinsert. Exactly one physical copy must remain.
    let len_before = tree.len();
    tree.insert(key, 2);
    assert_eq!(tree.len(), len_before, "reinsert duplicated the key");
    assert_eq!(tree.shard_of(&key), Some(1));
    assert_eq!(tree.redirect_of(&key), Some(1));
    assert_eq!(*tree.get(&key).unwrap(), 2);

    let mut sink = Vec::new();
    tree.range(&key, &key, &mut sink);
    assert_eq!(sink.len(), 1, "range sees a duplicate");
    assert_eq!(*sink[0].1, 2);
}

#[test]
fn test_container_gc_keeps_keys_reachable() {
    // A deflected key must survive GC: either its entry is live (router
    // still disagrees) or the entry is a tautology and routing finds it.
    let tree = load_aware_tree(8);
    for i in 0u64..1000 {
        tree.insert(i * 8, i);
    }
    tree.refresh_load_view();
    tree.insert(16000, 123);

    tree.gc_redirects();
    assert!(tree.contains(&16000));
    assert_eq!(*tree.get(&16000).unwrap(), 123);

    // The tautology bound: no surviving entry matches current routing.
    assert_eq!(tree.gc_redirects(), 0);
}
