//! Deterministic key generators for benchmarks and tests.
//!
//! Every generator is an infinite `Iterator<Item = u64>` driven by a
//! seeded [`StdRng`], so a run is reproducible from its seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform keys in `[lo, hi]`.
pub struct Uniform {
    rng: StdRng,
    lo: u64,
    hi: u64,
}

impl Uniform {
    /// Create a uniform generator over `[lo, hi]` (inclusive).
    pub fn new(seed: u64, lo: u64, hi: u64) -> Self {
        assert!(lo <= hi, "uniform range is empty");
        Self {
            rng: StdRng::seed_from_u64(seed),
            lo,
            hi,
        }
    }
}

impl Iterator for Uniform {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.rng.gen_range(self.lo..=self.hi))
    }
}

/// Keys drawn from `1..=n` with probability proportional to `k^(-theta)`,
/// smaller keys more frequent.
///
/// Uses the Gray et al. inverse-CDF approximation (SIGMOD 1994), the same
/// construction YCSB uses. At theta near 1 the head is heavy: the top 20%
/// of keys draw roughly 80% of the samples.
pub struct Zipfian {
    rng: StdRng,
    n: u64,
    zetan: f64,
    eta: f64,
    alpha: f64,
    half_pow_theta: f64,
}

impl Zipfian {
    /// Default skew parameter.
    pub const DEFAULT_THETA: f64 = 0.99;

    /// Create a zipfian generator over `1..=n` with skew `theta` in
    /// `(0, 1)`.
    pub fn new(seed: u64, n: u64, theta: f64) -> Self {
        assert!(n >= 1, "zipfian needs a non-empty key space");
        assert!(
            theta > 0.0 && theta < 1.0,
            "zipfian skew must be in (0, 1)"
        );
        let zetan = Self::zeta(n, theta);
        let zeta2 = Self::zeta(2, theta);
        let eta = (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta2 / zetan);
        Self {
            rng: StdRng::seed_from_u64(seed),
            n,
            zetan,
            eta,
            alpha: 1.0 / (1.0 - theta),
            half_pow_theta: 0.5f64.powf(theta),
        }
    }

    /// Harmonic-like normalizer: sum over `1..=n` of `1/i^theta`.
    fn zeta(n: u64, theta: f64) -> f64 {
        let mut sum = 0.0;
        for i in 1..=n {
            sum += 1.0 / (i as f64).powf(theta);
        }
        sum
    }
}

impl Iterator for Zipfian {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let u: f64 = self.rng.gen();
        let uz = u * self.zetan;
        let key = if uz < 1.0 {
            1
        } else if uz < 1.0 + self.half_pow_theta {
            2
        } else {
            let spread = (self.eta * u - self.eta + 1.0).powf(self.alpha);
            1 + (self.n as f64 * spread) as u64
        };
        Some(key.min(self.n))
    }
}

/// `start, start+1, start+2, ...`, wrapping at `u64::MAX`.
pub struct Sequential {
    next: u64,
}

impl Sequential {
    /// Create a sequential generator beginning at `start`.
    pub fn new(start: u64) -> Self {
        Self { next: start }
    }
}

impl Iterator for Sequential {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let key = self.next;
        self.next = self.next.wrapping_add(1);
        Some(key)
    }
}

/// `target, target+stride, target+2*stride, ...`: every key congruent to
/// `target` modulo `stride`.
///
/// Against a container with `stride` shards and direct (position) hashing,
/// every key lands on the same natural shard. This is the targeted-attack
/// pattern the adaptive strategies exist to absorb.
pub struct Adversarial {
    next: u64,
    stride: u64,
}

impl Adversarial {
    /// Create an adversarial generator aimed at shard `target` of a
    /// `stride`-shard container.
    pub fn new(stride: u64, target: u64) -> Self {
        assert!(stride >= 1, "stride must be at least 1");
        Self {
            next: target,
            stride,
        }
    }
}

impl Iterator for Adversarial {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let key = self.next;
        self.next = self.next.wrapping_add(self.stride);
        Some(key)
    }
}

/// With probability `hot_fraction`, a uniform key from the hot range;
/// otherwise a uniform key from the cold range. Both ranges inclusive.
pub struct Hotspot {
    rng: StdRng,
    cold: (u64, u64),
    hot: (u64, u64),
    hot_fraction: f64,
}

impl Hotspot {
    /// Create a hotspot generator.
    pub fn new(
        seed: u64,
        cold_lo: u64,
        cold_hi: u64,
        hot_lo: u64,
        hot_hi: u64,
        hot_fraction: f64,
    ) -> Self {
        assert!(cold_lo <= cold_hi, "cold range is empty");
        assert!(hot_lo <= hot_hi, "hot range is empty");
        assert!(
            (0.0..=1.0).contains(&hot_fraction),
            "hot fraction must be in [0, 1]"
        );
        Self {
            rng: StdRng::seed_from_u64(seed),
            cold: (cold_lo, cold_hi),
            hot: (hot_lo, hot_hi),
            hot_fraction,
        }
    }
}

impl Iterator for Hotspot {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let (lo, hi) = if self.rng.gen::<f64>() < self.hot_fraction {
            self.hot
        } else {
            self.cold
        };
        Some(self.rng.gen_range(lo..=hi))
    }
}
