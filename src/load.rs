//! Cached per-shard load view, refreshed by a background worker.
//!
//! The router must answer "is this shard hot?" and "which shard is least
//! loaded?" on every routing decision without touching N shard atomics per
//! call. A background thread snapshots shard sizes every refresh period and
//! publishes an immutable [`LoadSnapshot`]; between refreshes the view
//! accumulates per-shard pending deltas fed by insert/remove notifications,
//! so a burst faster than the refresh period still sees its own effect on
//! the distribution. Staleness degrades placement quality, never
//! correctness: every index handed out is a valid shard index.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

/// An immutable snapshot of per-shard sizes.
#[derive(Debug, Clone)]
pub(crate) struct LoadSnapshot {
    pub sizes: Vec<usize>,
    pub total: usize,
    pub least_loaded: usize,
}

impl LoadSnapshot {
    fn from_sizes(sizes: Vec<usize>) -> Self {
        let total = sizes.iter().sum();
        let least_loaded = sizes
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| **s)
            .map(|(i, _)| i)
            .unwrap_or(0);
        Self {
            sizes,
            total,
            least_loaded,
        }
    }
}

/// A per-shard delta counter padded to its own cache line.
#[repr(align(128))]
struct PaddedDelta(AtomicI64);

/// The shared load view: the latest published snapshot plus pending
/// deltas recorded since that snapshot.
pub(crate) struct LoadView {
    snapshot: RwLock<Arc<LoadSnapshot>>,
    pending: Box<[PaddedDelta]>,
    pending_total: AtomicI64,
}

impl LoadView {
    pub fn new(num_shards: usize) -> Self {
        let pending = (0..num_shards)
            .map(|_| PaddedDelta(AtomicI64::new(0)))
            .collect();
        Self {
            snapshot: RwLock::new(Arc::new(LoadSnapshot::from_sizes(vec![0; num_shards]))),
            pending,
            pending_total: AtomicI64::new(0),
        }
    }

    pub fn record_insert(&self, shard: usize) {
        self.pending[shard].0.fetch_add(1, Ordering::Relaxed);
        self.pending_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self, shard: usize) {
        self.pending[shard].0.fetch_sub(1, Ordering::Relaxed);
        self.pending_total.fetch_sub(1, Ordering::Relaxed);
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<LoadSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Snapshot size of `shard` adjusted by deltas recorded since publish.
    fn effective_size(&self, snapshot: &LoadSnapshot, shard: usize) -> i64 {
        snapshot.sizes[shard] as i64 + self.pending[shard].0.load(Ordering::Relaxed)
    }

    /// Whether `shard` is a hotspot: effective size above both the
    /// absolute floor and `factor` times the effective mean.
    pub fn is_hot(&self, shard: usize, factor: f64, min_abs: usize) -> bool {
        let snapshot = self.snapshot();
        let n = snapshot.sizes.len();
        if n < 2 || shard >= n {
            return false;
        }
        let size = self.effective_size(&snapshot, shard);
        let total = snapshot.total as i64 + self.pending_total.load(Ordering::Relaxed);
        let mean = total.max(0) as f64 / n as f64;
        let threshold = (factor * mean).max(min_abs as f64);
        size as f64 > threshold
    }

    /// The shard with the smallest effective size. Only the redirect path
    /// pays this O(N) scan; settled routes read nothing but the snapshot.
    pub fn least_loaded(&self) -> usize {
        let snapshot = self.snapshot();
        let mut best = snapshot.least_loaded;
        let mut best_size = self.effective_size(&snapshot, best);
        for i in 0..snapshot.sizes.len() {
            let size = self.effective_size(&snapshot, i);
            if size < best_size {
                best = i;
                best_size = size;
            }
        }
        best
    }

    /// Publish a fresh snapshot and fold the pending deltas into it.
    pub fn publish(&self, sizes: Vec<usize>) {
        let next = Arc::new(LoadSnapshot::from_sizes(sizes));
        // Deltas recorded from here on count against the new snapshot;
        // anything recorded between the size reads and this swap is noise
        // the next refresh absorbs.
        for delta in self.pending.iter() {
            delta.0.store(0, Ordering::Relaxed);
        }
        self.pending_total.store(0, Ordering::Relaxed);
        *self.snapshot.write() = next;
    }
}

/// Owns the background refresher thread. Signals shutdown and joins on
/// drop; the worker observes the flag within one refresh period.
pub(crate) struct LoadRefresher {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LoadRefresher {
    /// Spawn the refresher over the given size handles.
    pub fn spawn(
        view: Arc<LoadView>,
        sizes: Vec<Arc<AtomicUsize>>,
        period: Duration,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            tracing::debug!(shards = sizes.len(), ?period, "load refresher started");
            while !stop.load(Ordering::Acquire) {
                view.publish(read_sizes(&sizes));
                std::thread::sleep(period);
            }
            tracing::debug!("load refresher stopped");
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }
}

impl Drop for LoadRefresher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) fn read_sizes(sizes: &[Arc<AtomicUsize>]) -> Vec<usize> {
    sizes.iter().map(|s| s.load(Ordering::Acquire)).collect()
}
