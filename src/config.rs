use std::time::Duration;

use crate::error::Error;

/// Which hash function routes keys to shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashFunction {
    /// Use ahash (default, fast and well-dispersed).
    #[default]
    AHash,
    /// Route by the key's numeric position directly.
    ///
    /// Vulnerable to stride patterns by construction; intended for attack
    /// demonstrations and for exercising the adaptive strategies.
    Direct,
}

/// How the router picks a shard for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingStrategy {
    /// `hash % N`. Pure and stable; no defense against keys crafted to
    /// collide on one shard.
    StaticHash,
    /// Fixed partition of the key-position space into contiguous ranges.
    ///
    /// Worst-case demonstration mode: sequential keys concentrate on one
    /// shard. Construction logs a warning.
    Range,
    /// `hash % N`, with hot shards deflecting new keys to the least-loaded
    /// shard, subject to the adversary guard.
    LoadAware,
    /// Consistent hashing over a ring of virtual nodes.
    VirtualNodes,
    /// Virtual nodes plus load-aware deflection when the chosen shard runs
    /// hot (default).
    #[default]
    Intelligent,
}

/// Configuration for a ParaTree instance.
///
/// ```rust
/// use paratree::{Config, RoutingStrategy};
///
/// let config = Config::new()
///     .num_shards(8)?
///     .routing_strategy(RoutingStrategy::LoadAware);
/// # Ok::<(), paratree::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) num_shards: usize,
    pub(crate) strategy: RoutingStrategy,
    pub(crate) hash_function: HashFunction,
    pub(crate) virtual_nodes: usize,
    pub(crate) hotspot_factor: f64,
    pub(crate) hotspot_min_abs: usize,
    pub(crate) max_consecutive_redirects: u32,
    pub(crate) redirect_cooldown: Duration,
    pub(crate) refresh_period: Duration,
}

impl Config {
    /// Create a new config with defaults (8 shards, intelligent routing,
    /// ahash, 16 virtual nodes per shard).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards. Must be at least 1; fixed for the life of
    /// the container.
    pub fn num_shards(mut self, n: usize) -> Result<Self, Error> {
        if n == 0 {
            return Err(Error::InvalidShardCount);
        }
        self.num_shards = n;
        Ok(self)
    }

    /// Set the routing strategy.
    pub fn routing_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the hash function used for routing.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.hash_function = hash_fn;
        self
    }

    /// Set the number of virtual nodes per shard (ring strategies only).
    /// Must be at least 1.
    pub fn virtual_nodes_per_shard(mut self, v: usize) -> Result<Self, Error> {
        if v == 0 {
            return Err(Error::InvalidVirtualNodes);
        }
        self.virtual_nodes = v;
        Ok(self)
    }

    /// A shard is a hotspot when its size exceeds both
    /// `hotspot_factor * mean` and `hotspot_min_abs`.
    pub fn hotspot_factor(mut self, factor: f64) -> Result<Self, Error> {
        if factor < 1.0 || factor.is_nan() {
            return Err(Error::InvalidHotspotFactor);
        }
        self.hotspot_factor = factor;
        Ok(self)
    }

    /// Absolute floor below which a shard is never considered hot.
    pub fn hotspot_min_abs(mut self, min_abs: usize) -> Self {
        self.hotspot_min_abs = min_abs;
        self
    }

    /// How many redirects of the same key within the cooldown window mark
    /// it suspicious. Must be at least 1.
    pub fn max_consecutive_redirects(mut self, limit: u32) -> Result<Self, Error> {
        if limit == 0 {
            return Err(Error::InvalidRedirectLimit);
        }
        self.max_consecutive_redirects = limit;
        Ok(self)
    }

    /// Window within which repeated redirects of one key count as
    /// consecutive.
    pub fn redirect_cooldown(mut self, cooldown: Duration) -> Self {
        self.redirect_cooldown = cooldown;
        self
    }

    /// Period of the background load-view refresher. Must be non-zero.
    pub fn refresh_period(mut self, period: Duration) -> Result<Self, Error> {
        if period.is_zero() {
            return Err(Error::InvalidRefreshPeriod);
        }
        self.refresh_period = period;
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_shards: 8,
            strategy: RoutingStrategy::default(),
            hash_function: HashFunction::default(),
            virtual_nodes: 16,
            hotspot_factor: 1.5,
            hotspot_min_abs: 16,
            max_consecutive_redirects: 3,
            redirect_cooldown: Duration::from_millis(100),
            refresh_period: Duration::from_millis(1),
        }
    }
}

/// Builder for creating a ParaTree with custom configuration.
///
/// ```rust
/// use paratree::{ParaTreeBuilder, RoutingStrategy};
///
/// let tree = ParaTreeBuilder::new()
///     .num_shards(16)?
///     .routing_strategy(RoutingStrategy::VirtualNodes)
///     .build::<u64, String>()?;
/// tree.insert(7, "seven".to_string());
/// # Ok::<(), paratree::Error>(())
/// ```
#[derive(Debug)]
pub struct ParaTreeBuilder {
    config: Config,
}

impl ParaTreeBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the number of shards. Must be at least 1.
    pub fn num_shards(mut self, n: usize) -> Result<Self, Error> {
        self.config = self.config.num_shards(n)?;
        Ok(self)
    }

    /// Set the routing strategy.
    pub fn routing_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.config = self.config.routing_strategy(strategy);
        self
    }

    /// Set the hash function used for routing.
    pub fn hash_function(mut self, hash_fn: HashFunction) -> Self {
        self.config = self.config.hash_function(hash_fn);
        self
    }

    /// Set the number of virtual nodes per shard.
    pub fn virtual_nodes_per_shard(mut self, v: usize) -> Result<Self, Error> {
        self.config = self.config.virtual_nodes_per_shard(v)?;
        Ok(self)
    }

    /// Set the hotspot factor.
    pub fn hotspot_factor(mut self, factor: f64) -> Result<Self, Error> {
        self.config = self.config.hotspot_factor(factor)?;
        Ok(self)
    }

    /// Set the absolute hotspot floor.
    pub fn hotspot_min_abs(mut self, min_abs: usize) -> Self {
        self.config = self.config.hotspot_min_abs(min_abs);
        self
    }

    /// Set the consecutive-redirect limit.
    pub fn max_consecutive_redirects(mut self, limit: u32) -> Result<Self, Error> {
        self.config = self.config.max_consecutive_redirects(limit)?;
        Ok(self)
    }

    /// Set the redirect cooldown window.
    pub fn redirect_cooldown(mut self, cooldown: Duration) -> Self {
        self.config = self.config.redirect_cooldown(cooldown);
        self
    }

    /// Set the load-view refresh period.
    pub fn refresh_period(mut self, period: Duration) -> Result<Self, Error> {
        self.config = self.config.refresh_period(period)?;
        Ok(self)
    }

    /// Build a ParaTree with the configured settings.
    pub fn build<K, V>(self) -> Result<crate::ParaTree<K, V>, Error>
    where
        K: Ord + std::hash::Hash + Eq + Clone + crate::KeyPosition + Send + Sync,
        V: Send + Sync,
    {
        crate::ParaTree::with_config(self.config)
    }
}

impl Default for ParaTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn create_hasher(hash_fn: HashFunction) -> crate::hash::ShardHasher {
    match hash_fn {
        HashFunction::AHash => crate::hash::ShardHasher::AHash,
        HashFunction::Direct => crate::hash::ShardHasher::Direct,
    }
}
