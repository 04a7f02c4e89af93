//! The redirect index: the linearizability bridge between adaptive routing
//! and lookups.
//!
//! When the router deflects a key away from its natural shard, subsequent
//! lookups of that key would miss: they probe the natural shard first. The
//! index records `key -> actual shard` for every non-identity placement so
//! the read path can resolve deflected keys in one extra probe.
//!
//! Writers record or forget entries while still holding the shard lock
//! that commits the corresponding map mutation, which is what makes the
//! index agree with shard state from any reader's point of view.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Counters for redirect-index traffic.
#[derive(Debug, Clone, Default)]
pub struct RedirectIndexStats {
    /// Entries currently in the index.
    pub entries: usize,
    /// Redirects recorded since construction (including overwrites).
    pub recorded: u64,
    /// Lookup calls since construction.
    pub lookups: u64,
    /// Lookups that found an entry.
    pub hits: u64,
}

impl RedirectIndexStats {
    /// Hit percentage over all lookups, 0.0 when none were made.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 * 100.0 / self.lookups as f64
        }
    }
}

/// A process-wide map from key to the shard it was actually placed in,
/// for keys whose placement differs from their natural shard.
///
/// Reads run in parallel; writes are exclusive and short.
pub struct RedirectIndex<K> {
    entries: RwLock<HashMap<K, usize>>,
    recorded: AtomicU64,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl<K> RedirectIndex<K>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            recorded: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Record that `key` landed in `actual`. No-op when the placement is
    /// the natural one; otherwise overwrites any prior entry.
    pub fn record(&self, key: K, natural: usize, actual: usize) {
        if natural == actual {
            return;
        }
        self.entries.write().insert(key, actual);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Where `key` was placed, if it was deflected.
    pub fn lookup(&self, key: &K) -> Option<usize> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let found = self.entries.read().get(key).copied();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Drop `key`'s entry if present. Called on removal and on placements
    /// that land naturally. Checks under the shared lock first so the
    /// common no-entry case never takes the exclusive one.
    pub fn forget(&self, key: &K) {
        if !self.entries.read().contains_key(key) {
            return;
        }
        self.entries.write().remove(key);
    }

    /// Drop every entry `(k -> s)` for which the router's current decision
    /// for `k` is already `s`: the redirect has become a tautology.
    /// Returns how many entries were removed.
    pub fn gc_expired<F>(&self, route: F) -> usize
    where
        F: Fn(&K) -> usize,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, actual| route(key) != *actual);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "redirect index gc");
        }
        removed
    }

    /// Number of entries currently in the index.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Traffic counters and current size.
    pub fn stats(&self) -> RedirectIndexStats {
        RedirectIndexStats {
            entries: self.entries.read().len(),
            recorded: self.recorded.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

impl<K> Default for RedirectIndex<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
