//! Key-to-shard routing: static hashing, range partitioning, consistent
//! hashing over virtual nodes, and load-aware deflection with an adversary
//! guard.
//!
//! Routing is a pure function of router state: it reads the cached load
//! view and peeks the redirect history, and never takes a shard lock.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::config::{Config, RoutingStrategy};
use crate::hash::{KeyPosition, ShardHasher};
use crate::load::LoadView;

/// Bound on how many keys the adversary guard tracks at once. Oldest
/// histories fall out first.
const GUARD_CAPACITY: usize = 4096;

/// One routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RouteDecision {
    /// The shard the key should be placed in or probed at.
    pub shard: usize,
    /// The shard the strategy would pick with no deflection.
    pub natural: usize,
    /// Whether `shard != natural` because of load-aware deflection.
    pub redirected: bool,
}

/// Redirect history for one key.
struct RedirectHistory {
    consecutive: u32,
    last: Instant,
}

/// Counters the router exposes for statistics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RouterStats {
    pub redirects: u64,
    pub suppressed: u64,
    pub suspicious_keys: usize,
}

pub(crate) struct Router<K> {
    num_shards: usize,
    strategy: RoutingStrategy,
    hasher: ShardHasher,
    ring: Option<VnodeRing>,
    view: Arc<LoadView>,
    guard: Mutex<LruCache<K, RedirectHistory>>,
    hotspot_factor: f64,
    hotspot_min_abs: usize,
    max_consecutive: u32,
    cooldown: Duration,
    redirects: AtomicU64,
    suppressed: AtomicU64,
}

impl<K> Router<K>
where
    K: Hash + Eq + Clone + KeyPosition,
{
    pub fn new(config: &Config, hasher: ShardHasher, view: Arc<LoadView>) -> Self {
        let ring = match config.strategy {
            RoutingStrategy::VirtualNodes | RoutingStrategy::Intelligent => {
                Some(VnodeRing::build(config.num_shards, config.virtual_nodes))
            }
            _ => None,
        };
        let capacity = NonZeroUsize::new(GUARD_CAPACITY).unwrap();
        Self {
            num_shards: config.num_shards,
            strategy: config.strategy,
            hasher,
            ring,
            view,
            guard: Mutex::new(LruCache::new(capacity)),
            hotspot_factor: config.hotspot_factor,
            hotspot_min_abs: config.hotspot_min_abs,
            max_consecutive: config.max_consecutive_redirects,
            cooldown: config.redirect_cooldown,
            redirects: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// The shard the strategy assigns `key` with no deflection applied.
    /// Pure and stable for the life of the router.
    pub fn natural_shard(&self, key: &K) -> usize {
        match self.strategy {
            RoutingStrategy::StaticHash | RoutingStrategy::LoadAware => {
                (self.hasher.hash_key(key) % self.num_shards as u64) as usize
            }
            RoutingStrategy::Range => self.range_partition(key.position()),
            RoutingStrategy::VirtualNodes | RoutingStrategy::Intelligent => self
                .ring
                .as_ref()
                .map(|ring| ring.shard_for(self.hasher.hash_key(key)))
                .unwrap_or(0),
        }
    }

    /// Route `key`: the natural shard, possibly deflected to the least
    /// loaded shard when the natural one runs hot and the adversary guard
    /// permits it.
    pub fn route(&self, key: &K) -> RouteDecision {
        let natural = self.natural_shard(key);
        let settled = RouteDecision {
            shard: natural,
            natural,
            redirected: false,
        };
        match self.strategy {
            RoutingStrategy::StaticHash
            | RoutingStrategy::Range
            | RoutingStrategy::VirtualNodes => settled,
            RoutingStrategy::LoadAware | RoutingStrategy::Intelligent => {
                if !self
                    .view
                    .is_hot(natural, self.hotspot_factor, self.hotspot_min_abs)
                {
                    return settled;
                }
                if self.is_pinned(key) {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    return settled;
                }
                let target = self.view.least_loaded();
                if target == natural {
                    return settled;
                }
                RouteDecision {
                    shard: target,
                    natural,
                    redirected: true,
                }
            }
        }
    }

    /// Feed the load heuristics after a committed insert.
    pub fn record_insert(&self, shard: usize) {
        self.view.record_insert(shard);
    }

    /// Feed the load heuristics after a committed remove.
    pub fn record_remove(&self, shard: usize) {
        self.view.record_remove(shard);
    }

    /// Update the key's redirect history after a committed deflection.
    pub fn record_redirect(&self, key: &K) {
        let now = Instant::now();
        let mut guard = self.guard.lock();
        match guard.get_mut(key) {
            Some(history) => {
                if now.duration_since(history.last) > self.cooldown {
                    history.consecutive = 1;
                } else {
                    history.consecutive = history.consecutive.saturating_add(1);
                }
                history.last = now;
            }
            None => {
                guard.put(
                    key.clone(),
                    RedirectHistory {
                        consecutive: 1,
                        last: now,
                    },
                );
            }
        }
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the key is pinned to its natural shard: it crossed the
    /// consecutive-redirect limit and its history has not aged out.
    fn is_pinned(&self, key: &K) -> bool {
        let guard = self.guard.lock();
        match guard.peek(key) {
            Some(history) => {
                history.consecutive >= self.max_consecutive
                    && history.last.elapsed() <= self.cooldown
            }
            None => false,
        }
    }

    pub fn strategy(&self) -> RoutingStrategy {
        self.strategy
    }

    pub fn stats(&self) -> RouterStats {
        let guard = self.guard.lock();
        let suspicious_keys = guard
            .iter()
            .filter(|(_, h)| {
                h.consecutive >= self.max_consecutive && h.last.elapsed() <= self.cooldown
            })
            .count();
        RouterStats {
            redirects: self.redirects.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            suspicious_keys,
        }
    }

    /// Contiguous slice of the position space, `num_shards` slices.
    fn range_partition(&self, position: u64) -> usize {
        ((position as u128 * self.num_shards as u128) >> 64) as usize
    }
}

/// Consistent-hash ring: `virtual_nodes` points per shard, placed by
/// hashing (shard, replica). A key belongs to the first point at or after
/// its hash, wrapping at the top of the ring.
struct VnodeRing {
    points: BTreeMap<u64, usize>,
}

impl VnodeRing {
    fn build(num_shards: usize, virtual_nodes: usize) -> Self {
        let mut points = BTreeMap::new();
        for shard in 0..num_shards {
            for replica in 0..virtual_nodes {
                let mut hasher = ahash::AHasher::default();
                (shard as u64, replica as u64).hash(&mut hasher);
                let mut point = hasher.finish();
                // Collisions get nudged to the next free slot.
                while points.contains_key(&point) {
                    point = point.wrapping_add(1);
                }
                points.insert(point, shard);
            }
        }
        Self { points }
    }

    fn shard_for(&self, hash: u64) -> usize {
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, shard)| *shard)
            .unwrap_or(0)
    }
}
