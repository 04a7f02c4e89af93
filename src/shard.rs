use std::collections::BTreeMap;
use std::ops::Bound::Included;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

/// The ordered map a shard guards. Values sit behind `Arc` so reads hand
/// out shared handles without copying.
pub(crate) type Tree<K, V> = BTreeMap<K, Arc<V>>;

/// A single shard: one ordered map behind a read-write lock, plus atomic
/// metadata for lock-free introspection.
///
/// `size` and `has_keys` are readable without the map lock; `bounds` sits
/// behind its own short lock because generic keys cannot live in raw
/// atomics. Writers refresh `bounds` and then release-store `has_keys`
/// after the map mutation commits, so a pruner that acquire-loads
/// `has_keys` never sees bounds older than a completed mutation. Pruning
/// may be spuriously positive (a later locked scan finds nothing) but
/// never falsely negative for a key present when the pruner started.
///
/// Aligned to 128 bytes so neighboring shards do not share cache lines
/// under contention.
#[repr(align(128))]
pub(crate) struct Shard<K, V> {
    map: RwLock<Tree<K, V>>,
    size: Arc<AtomicUsize>,
    has_keys: AtomicBool,
    bounds: RwLock<Option<(K, K)>>,
}

impl<K, V> Shard<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Send + Sync,
{
    pub fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
            size: Arc::new(AtomicUsize::new(0)),
            has_keys: AtomicBool::new(false),
            bounds: RwLock::new(None),
        }
    }

    /// Shared handle to this shard's size counter, for the load refresher.
    pub fn size_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.size)
    }

    /// Acquire the map for writing. Multi-step protocols pass the guard
    /// back into `*_locked` so one acquisition covers the whole step.
    pub fn write(&self) -> RwLockWriteGuard<'_, Tree<K, V>> {
        self.map.write()
    }

    /// Upsert under an already-held write guard. Returns the previous
    /// value if the key existed.
    pub fn upsert_locked(
        &self,
        map: &mut Tree<K, V>,
        key: K,
        value: V,
    ) -> Option<Arc<V>> {
        let old = map.insert(key, Arc::new(value));
        if old.is_none() {
            self.size.fetch_add(1, Ordering::AcqRel);
        }
        self.refresh_bounds(map);
        old
    }

    /// Remove under an already-held write guard.
    pub fn remove_locked(&self, map: &mut Tree<K, V>, key: &K) -> Option<Arc<V>> {
        let removed = map.remove(key);
        if removed.is_some() {
            self.size.fetch_sub(1, Ordering::AcqRel);
            self.refresh_bounds(map);
        }
        removed
    }

    /// Re-derive size and bounds from the map under an already-held write
    /// guard. Used after bulk moves.
    pub fn resync_locked(&self, map: &Tree<K, V>) {
        self.size.store(map.len(), Ordering::Release);
        self.refresh_bounds(map);
    }

    /// Get a value by key. Shared lock; BTreeMap tolerates concurrent
    /// `&`-reads.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.map.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    /// Lock-free size read.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Lock-free pruning test for `[lo, hi]`. `false` only when the shard
    /// provably holds nothing in the range.
    pub fn intersects_range(&self, lo: &K, hi: &K) -> bool {
        if !self.has_keys.load(Ordering::Acquire) {
            return false;
        }
        match &*self.bounds.read() {
            Some((min, max)) => !(max < lo || min > hi),
            // Flag raced ahead of the bounds write; err on the side of
            // scanning.
            None => true,
        }
    }

    /// In-order append of every `(k, v)` with `lo <= k <= hi` to the sink,
    /// under the shard's read lock.
    pub fn range_into(&self, lo: &K, hi: &K, sink: &mut Vec<(K, Arc<V>)>) {
        if lo > hi {
            return;
        }
        let map = self.map.read();
        for (k, v) in map.range((Included(lo), Included(hi))) {
            sink.push((k.clone(), Arc::clone(v)));
        }
    }

    /// Current `(min, max)` keys, if any. Reads the bounds cache under one
    /// acquisition, not the map.
    pub fn key_bounds(&self) -> Option<(K, K)> {
        self.bounds.read().clone()
    }

    fn refresh_bounds(&self, map: &Tree<K, V>) {
        let next = match (map.first_key_value(), map.last_key_value()) {
            (Some((min, _)), Some((max, _))) => Some((min.clone(), max.clone())),
            _ => None,
        };
        let nonempty = next.is_some();
        *self.bounds.write() = next;
        // Bounds are committed before the flag so acquire-readers of the
        // flag observe bounds at least this fresh.
        self.has_keys.store(nonempty, Ordering::Release);
    }
}
