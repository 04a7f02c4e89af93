//! Statistics types and the container's operation counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation totals since construction, by kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpTotals {
    /// Inserts that created a new key.
    pub inserts: u64,
    /// Inserts that overwrote an existing key.
    pub updates: u64,
    /// Removes that erased a key.
    pub removes: u64,
    /// `get` calls.
    pub gets: u64,
    /// `contains` calls.
    pub contains: u64,
    /// Range scans.
    pub ranges: u64,
}

impl OpTotals {
    /// Sum over all kinds.
    pub fn total(&self) -> u64 {
        self.inserts + self.updates + self.removes + self.gets + self.contains + self.ranges
    }
}

/// Relaxed atomic counters behind the container's `&self` API.
#[derive(Default)]
pub(crate) struct OpCounters {
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    gets: AtomicU64,
    contains: AtomicU64,
    ranges: AtomicU64,
}

impl OpCounters {
    #[inline]
    pub fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn contains(&self) {
        self.contains.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn range(&self) {
        self.ranges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OpTotals {
        OpTotals {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            contains: self.contains.load(Ordering::Relaxed),
            ranges: self.ranges.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time statistics snapshot of a ParaTree.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Number of entries in each shard, by shard index.
    pub shard_sizes: Vec<usize>,
    /// Total number of entries across all shards.
    pub size: usize,
    /// Mean entries per shard.
    pub mean: f64,
    /// Population standard deviation of the shard sizes.
    pub stddev: f64,
    /// `max(0, 1 - stddev/mean)`: 1.0 is perfectly even, 0.0 is fully
    /// concentrated. An empty container scores 1.0.
    pub balance_score: f64,
    /// Entries currently held by the redirect index.
    pub redirect_index_size: usize,
    /// Redirects recorded by the router since construction.
    pub redirects: u64,
    /// Redirects the adversary guard suppressed.
    pub redirects_suppressed: u64,
    /// Keys currently pinned as suspicious.
    pub suspicious_keys: usize,
    /// Operation totals by kind.
    pub operations: OpTotals,
}

/// Mean, population stddev, and balance score of a size distribution.
pub(crate) fn distribution(sizes: &[usize]) -> (f64, f64, f64) {
    if sizes.is_empty() {
        return (0.0, 0.0, 1.0);
    }
    let n = sizes.len() as f64;
    let mean = sizes.iter().sum::<usize>() as f64 / n;
    let variance = sizes
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();
    let balance = if mean == 0.0 {
        1.0
    } else {
        (1.0 - stddev / mean).max(0.0)
    };
    (mean, stddev, balance)
}
