use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{create_hasher, Config, RoutingStrategy};
use crate::error::Error;
use crate::hash::KeyPosition;
use crate::load::{LoadRefresher, LoadView};
use crate::redirect::RedirectIndex;
use crate::router::Router;
use crate::shard::Shard;
use crate::stats::{distribution, OpCounters, Stats};

/// Concurrent sharded ordered map with adaptive routing.
///
/// Keys are split across N independent ordered maps, each behind its own
/// lock, so operations on different shards never contend. The router picks
/// a shard per key; under the load-aware strategies a hot shard deflects
/// new keys to the least-loaded shard, and the redirect index keeps those
/// keys findable. A background worker refreshes the cached load view the
/// router reads.
///
/// # Example
///
/// ```rust
/// use paratree::ParaTree;
///
/// let tree = ParaTree::new();
/// tree.insert(42u64, "answer");
///
/// if let Some(value) = tree.get(&42) {
///     assert_eq!(*value, "answer");
/// }
///
/// let mut sink = Vec::new();
/// tree.range(&0, &100, &mut sink);
/// assert_eq!(sink.len(), 1);
/// ```
///
/// # Placement protocol
///
/// The redirect index is the placement authority. Writers consult it
/// first and re-verify the entry under the target shard's lock; a
/// deflected placement records its entry while still holding the natural
/// shard's lock, so same-key placement decisions serialize there and a
/// key can never end up in two shards. After a redirect gc has dropped
/// entries, an insert additionally probes for an existing unindexed copy
/// of the key (the router's current decision first, then the remaining
/// shards) before placing anything, so a reinsert lands on that copy and
/// re-records its entry instead of duplicating it. Index changes always
/// commit before the shard lock that covers them is released. Lock order
/// is shard lock then index lock, at most one shard lock at a time; only
/// [`rebalance_shards`](Self::rebalance_shards) holds several, in
/// ascending index order.
pub struct ParaTree<K, V> {
    shards: Vec<Shard<K, V>>,
    router: Router<K>,
    redirects: RedirectIndex<K>,
    view: Arc<LoadView>,
    counters: OpCounters,
    gc_drops: AtomicU64,
    _refresher: LoadRefresher,
}

impl<K, V> ParaTree<K, V>
where
    K: Ord + Hash + Eq + Clone + KeyPosition + Send + Sync,
    V: Send + Sync,
{
    /// Create a new tree with defaults (8 shards, intelligent routing).
    pub fn new() -> Self {
        Self::with_config(Config::default()).unwrap()
    }

    /// Create a new tree with the given number of shards and default
    /// routing.
    pub fn with_shards(num_shards: usize) -> Result<Self, Error> {
        Self::with_config(Config::default().num_shards(num_shards)?)
    }

    /// Create a new tree with custom config.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        if config.num_shards == 0 {
            return Err(Error::InvalidShardCount);
        }
        if config.strategy == RoutingStrategy::Range {
            tracing::warn!(
                "range routing concentrates ordered keys on few shards; \
                 worst-case demonstration mode"
            );
        }

        let shards: Vec<Shard<K, V>> = (0..config.num_shards).map(|_| Shard::new()).collect();
        let view = Arc::new(LoadView::new(config.num_shards));
        let router = Router::new(
            &config,
            create_hasher(config.hash_function),
            Arc::clone(&view),
        );
        let size_handles = shards.iter().map(|s| s.size_handle()).collect();
        let refresher =
            LoadRefresher::spawn(Arc::clone(&view), size_handles, config.refresh_period);

        Ok(Self {
            shards,
            router,
            redirects: RedirectIndex::new(),
            view,
            counters: OpCounters::default(),
            gc_drops: AtomicU64::new(0),
            _refresher: refresher,
        })
    }

    /// Insert a key-value pair. Returns the old value if the key existed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use paratree::ParaTree;
    ///
    /// let tree = ParaTree::new();
    /// assert!(tree.insert(1u64, "one").is_none());
    /// assert_eq!(tree.insert(1, "uno").unwrap().as_ref(), &"one");
    /// ```
    pub fn insert(&self, key: K, value: V) -> Option<Arc<V>> {
        loop {
            // A deflected key updates in place, wherever it lives.
            if let Some(s) = self.redirects.lookup(&key) {
                let shard = &self.shards[s];
                let mut map = shard.write();
                if self.redirects.lookup(&key) != Some(s) {
                    continue;
                }
                let old = shard.upsert_locked(&mut map, key, value);
                drop(map);
                return self.finish_insert(s, old);
            }

            let decision = self.router.route(&key);
            let natural = decision.natural;

            // A gc may have dropped the entry of a key that still lives
            // outside its natural shard; once routing drifts, that copy is
            // covered by neither the index nor the current decision. Same
            // third fallback the read path uses, extended to the remaining
            // shards: a reinsert must land on the existing copy and
            // re-record its entry, never place a second one. Keys in a
            // container that never gc'd can have no such copy, so this
            // costs nothing until a gc drops entries.
            if self.gc_drops.load(Ordering::Relaxed) > 0
                && !self.shards[natural].contains(&key)
            {
                if let Some(stray) = self.find_stray(&key, natural, decision.shard) {
                    let host = &self.shards[stray];
                    let mut hmap = host.write();
                    if !hmap.contains_key(&key) {
                        // Moved while unlocked; retry.
                        continue;
                    }
                    // Re-cover the copy while this lock pins it in place.
                    self.redirects.record(key.clone(), natural, stray);
                    let old = host.upsert_locked(&mut hmap, key, value);
                    drop(hmap);
                    return self.finish_insert(stray, old);
                }
            }

            let shard = &self.shards[natural];
            let mut map = shard.write();

            // Deflected placements record their entry under this lock, so
            // re-checking here is authoritative.
            match self.redirects.lookup(&key) {
                Some(s) if s != natural => {
                    drop(map);
                    continue;
                }
                _ => {}
            }

            if !decision.redirected || map.contains_key(&key) {
                let old = shard.upsert_locked(&mut map, key, value);
                drop(map);
                return self.finish_insert(natural, old);
            }

            // Deflected placement: publish the entry before touching the
            // target shard, while same-key writers are still serialized on
            // the natural shard's lock.
            self.redirects.record(key.clone(), natural, decision.shard);
            drop(map);

            let target = &self.shards[decision.shard];
            let mut tmap = target.write();
            if self.redirects.lookup(&key) != Some(decision.shard) {
                drop(tmap);
                continue;
            }
            self.router.record_redirect(&key);
            let old = target.upsert_locked(&mut tmap, key, value);
            drop(tmap);
            return self.finish_insert(decision.shard, old);
        }
    }

    fn finish_insert(&self, shard: usize, old: Option<Arc<V>>) -> Option<Arc<V>> {
        if old.is_none() {
            self.router.record_insert(shard);
            self.counters.insert();
        } else {
            self.counters.update();
        }
        old
    }

    /// Probe for an unindexed copy of the key outside its natural shard:
    /// the router's current target first, then the remaining shards. Only
    /// called once a gc has dropped entries, the sole way such a copy can
    /// come to exist.
    fn find_stray(&self, key: &K, natural: usize, target: usize) -> Option<usize> {
        if target != natural && self.shards[target].contains(key) {
            return Some(target);
        }
        (0..self.shards.len())
            .filter(|&i| i != natural && i != target)
            .find(|&i| self.shards[i].contains(key))
    }

    /// Remove a key, returning the value if it existed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use paratree::ParaTree;
    ///
    /// let tree = ParaTree::new();
    /// tree.insert(1u64, "one");
    /// assert_eq!(tree.remove(&1).unwrap().as_ref(), &"one");
    /// assert!(tree.remove(&1).is_none());
    /// ```
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        loop {
            let natural = self.router.natural_shard(key);
            let shard = &self.shards[natural];
            let mut map = shard.write();
            if let Some(value) = shard.remove_locked(&mut map, key) {
                drop(map);
                return self.finish_remove(natural, value);
            }
            let entry = self.redirects.lookup(key);
            drop(map);

            match entry {
                Some(s) if s != natural => {
                    let tshard = &self.shards[s];
                    let mut tmap = tshard.write();
                    if self.redirects.lookup(key) != Some(s) {
                        continue;
                    }
                    match tshard.remove_locked(&mut tmap, key) {
                        Some(value) => {
                            // Forget while the shard lock still covers the
                            // erase.
                            self.redirects.forget(key);
                            drop(tmap);
                            return self.finish_remove(s, value);
                        }
                        // The entry belongs to an in-flight placement; we
                        // linearize ahead of it.
                        None => return None,
                    }
                }
                _ => {
                    // No entry. A key whose entry was collected as a
                    // tautology still lives at the router's current
                    // decision.
                    let current = self.router.route(key).shard;
                    if current != natural {
                        let tshard = &self.shards[current];
                        let mut tmap = tshard.write();
                        if let Some(value) = tshard.remove_locked(&mut tmap, key) {
                            self.redirects.forget(key);
                            drop(tmap);
                            return self.finish_remove(current, value);
                        }
                    }
                    return None;
                }
            }
        }
    }

    fn finish_remove(&self, shard: usize, value: Arc<V>) -> Option<Arc<V>> {
        self.router.record_remove(shard);
        self.counters.remove();
        Some(value)
    }

    /// Get a value by key. Returns an `Arc<V>` so you can share it without
    /// copying.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.counters.get();
        loop {
            let natural = self.router.natural_shard(key);
            if let Some(value) = self.shards[natural].get(key) {
                return Some(value);
            }
            match self.redirects.lookup(key) {
                Some(s) => {
                    if let Some(value) = self.shards[s].get(key) {
                        return Some(value);
                    }
                    // Entry moved underneath us (rebalance): retry. A
                    // stable entry with no key is an in-flight placement;
                    // we linearize ahead of it.
                    if self.redirects.lookup(key) != Some(s) {
                        continue;
                    }
                    return None;
                }
                None => {
                    let current = self.router.route(key).shard;
                    if current != natural {
                        if let Some(value) = self.shards[current].get(key) {
                            return Some(value);
                        }
                    }
                    return None;
                }
            }
        }
    }

    /// Returns whether the tree holds a value for the given key.
    pub fn contains(&self, key: &K) -> bool {
        self.counters.contains();
        loop {
            let natural = self.router.natural_shard(key);
            if self.shards[natural].contains(key) {
                return true;
            }
            match self.redirects.lookup(key) {
                Some(s) => {
                    if self.shards[s].contains(key) {
                        return true;
                    }
                    if self.redirects.lookup(key) != Some(s) {
                        continue;
                    }
                    return false;
                }
                None => {
                    let current = self.router.route(key).shard;
                    return current != natural && self.shards[current].contains(key);
                }
            }
        }
    }

    /// Append every `(k, v)` with `lo <= k <= hi` to the sink.
    ///
    /// Shards are visited in index order and each shard's contribution is
    /// sorted, but the concatenation is not globally sorted: a key routed
    /// to shard 3 can be smaller than one routed to shard 1. Callers who
    /// need a single sorted stream merge the shard-sorted runs themselves.
    /// Shards that provably hold nothing in the range are skipped without
    /// taking their lock. `lo > hi` yields nothing.
    ///
    /// # Example
    ///
    /// ```rust
    /// use paratree::ParaTree;
    ///
    /// let tree = ParaTree::new();
    /// for k in 0u64..100 {
    ///     tree.insert(k, k * 2);
    /// }
    /// let mut sink = Vec::new();
    /// tree.range(&10, &19, &mut sink);
    /// assert_eq!(sink.len(), 10);
    /// ```
    pub fn range(&self, lo: &K, hi: &K, sink: &mut Vec<(K, Arc<V>)>) {
        self.counters.range();
        if lo > hi {
            return;
        }
        for shard in &self.shards {
            if shard.intersects_range(lo, hi) {
                shard.range_into(lo, hi, sink);
            }
        }
    }

    /// Total number of entries, summed lock-free over the shard counters.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of shards, fixed at construction.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The routing strategy this tree was built with.
    pub fn routing_strategy(&self) -> RoutingStrategy {
        self.router.strategy()
    }

    /// Per-shard entry counts, lock-free. Use for imbalance detection.
    pub fn shard_loads(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.len()).collect()
    }

    /// The cached `(min, max)` key bounds of one shard, or `None` if the
    /// shard is empty or the index is out of range. These are the bounds
    /// range scans prune with.
    pub fn shard_bounds(&self, shard: usize) -> Option<(K, K)> {
        self.shards.get(shard)?.key_bounds()
    }

    /// The shard the routing strategy assigns this key before any
    /// deflection.
    pub fn natural_shard_of(&self, key: &K) -> usize {
        self.router.natural_shard(key)
    }

    /// The shard the key currently resides in, or `None` if absent.
    pub fn shard_of(&self, key: &K) -> Option<usize> {
        let natural = self.router.natural_shard(key);
        if self.shards[natural].contains(key) {
            return Some(natural);
        }
        if let Some(s) = self.redirects.lookup(key) {
            if self.shards[s].contains(key) {
                return Some(s);
            }
        }
        let current = self.router.route(key).shard;
        if current != natural && self.shards[current].contains(key) {
            return Some(current);
        }
        None
    }

    /// The redirect-index entry for this key, if it has one: the shard a
    /// deflected placement actually landed in.
    pub fn redirect_of(&self, key: &K) -> Option<usize> {
        self.redirects.lookup(key)
    }

    /// Drop every redirect-index entry whose target matches the router's
    /// current decision for its key. Returns the number of entries
    /// removed. Memory-bounded: one pass over the index under its
    /// exclusive section.
    pub fn gc_redirects(&self) -> usize {
        let removed = self
            .redirects
            .gc_expired(|key| self.router.route(key).shard);
        if removed > 0 {
            // Arms the recovery probe in `insert`: dropped entries are the
            // one source of unindexed copies outside their natural shard.
            self.gc_drops.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Recompute the cached load view from current shard sizes, without
    /// waiting for the background refresher. Tooling and tests.
    pub fn refresh_load_view(&self) {
        self.view.publish(self.shard_loads());
    }

    /// Get detailed statistics about the tree and its shards.
    pub fn stats(&self) -> Stats {
        let shard_sizes = self.shard_loads();
        let size = shard_sizes.iter().sum();
        let (mean, stddev, balance_score) = distribution(&shard_sizes);
        let router = self.router.stats();
        Stats {
            shard_sizes,
            size,
            mean,
            stddev,
            balance_score,
            redirect_index_size: self.redirects.len(),
            redirects: router.redirects,
            redirects_suppressed: router.suppressed,
            suspicious_keys: router.suspicious_keys,
            operations: self.counters.snapshot(),
        }
    }

    /// Traffic counters of the redirect index.
    pub fn redirect_stats(&self) -> crate::redirect::RedirectIndexStats {
        self.redirects.stats()
    }

    /// Whether the largest shard exceeds `threshold` times the mean.
    /// Diagnostic companion to [`rebalance_shards`](Self::rebalance_shards).
    pub fn should_rebalance(&self, threshold: f64) -> bool {
        let sizes = self.shard_loads();
        let total: usize = sizes.iter().sum();
        if total == 0 {
            return false;
        }
        let mean = total as f64 / sizes.len() as f64;
        let max = sizes.iter().copied().max().unwrap_or(0);
        max as f64 > threshold * mean
    }

    /// Move entries from overloaded shards to underloaded ones until no
    /// shard exceeds `factor` times the mean.
    ///
    /// Diagnostic utility, not part of the recommended operating mode:
    /// the adaptive strategies prevent imbalance instead of repairing it.
    /// Takes every shard lock in ascending index order (the one place the
    /// tree holds more than one), stalls all other operations for the
    /// duration, and keeps the redirect index consistent for every moved
    /// key.
    pub fn rebalance_shards(&self, factor: f64) {
        let factor = factor.max(1.0);
        let mut guards: Vec<_> = self.shards.iter().map(|s| s.write()).collect();
        let n = guards.len();
        if n < 2 {
            return;
        }
        let total: usize = guards.iter().map(|g| g.len()).sum();
        let mean = total as f64 / n as f64;
        let cap = (mean * factor).ceil().max(1.0) as usize;

        loop {
            let donor = (0..n).max_by_key(|&i| guards[i].len()).unwrap();
            let receiver = (0..n).min_by_key(|&i| guards[i].len()).unwrap();
            if guards[donor].len() <= cap || guards[donor].len() <= guards[receiver].len() + 1
            {
                break;
            }
            let (key, value) = guards[donor].pop_last().unwrap();
            let natural = self.router.natural_shard(&key);
            if receiver == natural {
                self.redirects.forget(&key);
            } else {
                self.redirects.record(key.clone(), natural, receiver);
            }
            guards[receiver].insert(key, value);
        }

        for (i, guard) in guards.iter().enumerate() {
            self.shards[i].resync_locked(guard);
        }
    }
}

impl<K, V> Default for ParaTree<K, V>
where
    K: Ord + Hash + Eq + Clone + KeyPosition + Send + Sync,
    V: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
