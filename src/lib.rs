//! # ParaTree
//!
//! A concurrent, sharded, *ordered* key-value map with adaptive routing.
//!
//! ParaTree splits your data across N independent ordered maps, each with
//! its own lock, so operations on different shards don't block each other.
//! On top of the shards sits an adaptive router: under the load-aware
//! strategies a shard that runs hot deflects new keys to the least-loaded
//! shard, which keeps targeted workloads (every key crafted to hash to
//! one shard) from collapsing the container onto a single lock. A
//! redirect index keeps deflected keys findable, so single-key operations
//! stay linearizable, and an adversary guard pins keys that oscillate
//! suspiciously so an attacker cannot chase load around the container.
//!
//! Values are stored behind `Arc<T>` so reads hand out shared handles
//! without copying.
//!
//! ## Features
//!
//! - **Ordered**: range scans over `[lo, hi]`, shard-sorted output
//! - **Thread-safe**: all operations take `&self` and are linearizable
//! - **Adaptive**: five routing strategies, from plain hashing to hybrid
//!   consistent-hashing with load-aware deflection
//! - **Attack-resistant**: hotspot detection, redirect rate limiting, and
//!   suspicious-key pinning
//! - **Observable**: per-shard sizes, balance score, redirect and
//!   operation counters
//! - **Benchmarkable**: seeded workload generators and a statistical
//!   harness with confidence intervals and latency percentiles
//!
//! ## Example
//!
//! ```rust
//! use paratree::ParaTree;
//!
//! let tree = ParaTree::new();
//!
//! tree.insert(10u64, "ten");
//! tree.insert(20, "twenty");
//!
//! assert_eq!(*tree.get(&10).unwrap(), "ten");
//! assert!(tree.contains(&20));
//!
//! let mut sink = Vec::new();
//! tree.range(&0, &15, &mut sink);
//! assert_eq!(sink.len(), 1);
//!
//! tree.remove(&10);
//! assert!(!tree.contains(&10));
//!
//! let stats = tree.stats();
//! assert_eq!(stats.size, 1);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use paratree::{ParaTreeBuilder, RoutingStrategy};
//!
//! let tree = ParaTreeBuilder::new()
//!     .num_shards(16)?
//!     .routing_strategy(RoutingStrategy::LoadAware)
//!     .hotspot_factor(2.0)?
//!     .build::<u64, String>()?;
//! tree.insert(1, "one".to_string());
//! # Ok::<(), paratree::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

/// Configuration and builder types.
pub mod config;
/// Error types.
pub mod error;
/// Statistical benchmark harness.
pub mod harness;
/// Hash functions and key positions for routing.
pub mod hash;
mod load;
/// The redirect index.
pub mod redirect;
mod router;
mod shard;
/// Statistics types.
pub mod stats;
/// The top-level container.
pub mod tree;
/// Deterministic workload generators.
pub mod workload;

// Re-export main types
pub use config::{Config, HashFunction, ParaTreeBuilder, RoutingStrategy};
pub use error::Error;
pub use hash::KeyPosition;
pub use redirect::{RedirectIndex, RedirectIndexStats};
pub use stats::{OpTotals, Stats};
pub use tree::ParaTree;
