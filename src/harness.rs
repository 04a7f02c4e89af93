//! Statistical benchmark harness: timed multi-round runs of a mixed
//! workload with throughput confidence intervals and latency percentiles.
//!
//! A run executes a warmup phase and then R independent timed rounds.
//! Throughput is reported as mean and standard deviation over the rounds
//! with a 95% confidence interval from the Student t-distribution at R-1
//! degrees of freedom; latencies are pooled across all rounds and reported
//! as percentiles.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tree::ParaTree;

/// Operation mix in percent. Must sum to 100.
#[derive(Debug, Clone, Copy)]
pub struct MixRatios {
    /// Percentage of `get` operations.
    pub get_pct: u32,
    /// Percentage of `insert` operations.
    pub insert_pct: u32,
    /// Percentage of `remove` operations.
    pub remove_pct: u32,
}

impl MixRatios {
    /// 90% reads, 5% inserts, 5% removes.
    pub fn read_heavy() -> Self {
        Self {
            get_pct: 90,
            insert_pct: 5,
            remove_pct: 5,
        }
    }

    /// 10% reads, 45% inserts, 45% removes.
    pub fn write_heavy() -> Self {
        Self {
            get_pct: 10,
            insert_pct: 45,
            remove_pct: 45,
        }
    }

    /// 50% reads, 25% inserts, 25% removes.
    pub fn balanced() -> Self {
        Self {
            get_pct: 50,
            insert_pct: 25,
            remove_pct: 25,
        }
    }

    fn validate(&self) {
        assert_eq!(
            self.get_pct + self.insert_pct + self.remove_pct,
            100,
            "mix ratios must sum to 100"
        );
    }
}

/// Shape of a harness run.
#[derive(Debug, Clone, Copy)]
pub struct HarnessConfig {
    /// Worker threads per round.
    pub threads: usize,
    /// Operations per round, split across the workers.
    pub ops_per_round: usize,
    /// Independent timed rounds after warmup.
    pub rounds: usize,
    /// Untimed operations before the first round.
    pub warmup_ops: usize,
    /// Operation mix.
    pub mix: MixRatios,
    /// Base seed; round and thread indices are folded in.
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            ops_per_round: 40_000,
            rounds: 10,
            warmup_ops: 10_000,
            mix: MixRatios::balanced(),
            seed: 42,
        }
    }
}

/// Pooled latency percentiles over every timed operation.
#[derive(Debug, Clone, Copy)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: Duration,
    /// 90th percentile.
    pub p90: Duration,
    /// 99th percentile.
    pub p99: Duration,
    /// 99.9th percentile.
    pub p999: Duration,
}

/// Results of a harness run.
#[derive(Debug, Clone)]
pub struct Report {
    /// Timed rounds executed.
    pub rounds: usize,
    /// Operations per round.
    pub ops_per_round: usize,
    /// Mean throughput over the rounds, operations per second.
    pub mean_ops_per_sec: f64,
    /// Standard deviation of the per-round throughput (sample, n-1).
    pub stddev_ops_per_sec: f64,
    /// 95% confidence interval for the mean throughput.
    pub ci95_ops_per_sec: (f64, f64),
    /// Latency percentiles pooled across all rounds.
    pub latency: LatencyPercentiles,
}

/// Two-sided 97.5% quantiles of the t-distribution for 1..=30 degrees of
/// freedom; beyond that the normal quantile is close enough.
const T_975: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179,
    2.160, 2.145, 2.131, 2.120, 2.110, 2.101, 2.093, 2.086, 2.080, 2.074, 2.069, 2.064,
    2.060, 2.056, 2.052, 2.048, 2.045, 2.042,
];

fn t_975(df: usize) -> f64 {
    if df == 0 {
        return f64::INFINITY;
    }
    T_975.get(df - 1).copied().unwrap_or(1.960)
}

/// Insert `count` keys from the generator, keyed to themselves.
pub fn prepopulate<G>(tree: &ParaTree<u64, u64>, keys: G, count: usize)
where
    G: Iterator<Item = u64>,
{
    for key in keys.take(count) {
        tree.insert(key, key);
    }
}

/// Run the mixed workload and report throughput and latency statistics.
///
/// `make_keys` builds one key generator per worker from a derived seed,
/// so every worker draws an independent, reproducible stream.
///
/// # Example
///
/// ```rust,no_run
/// use paratree::{harness, workload, ParaTree};
///
/// let tree = ParaTree::new();
/// harness::prepopulate(&tree, workload::Uniform::new(1, 0, 100_000), 50_000);
///
/// let config = harness::HarnessConfig::default();
/// let report = harness::run_mixed(&tree, config, |seed| {
///     workload::Uniform::new(seed, 0, 100_000)
/// });
/// println!(
///     "{:.0} ops/s +- {:.0}",
///     report.mean_ops_per_sec, report.stddev_ops_per_sec
/// );
/// ```
pub fn run_mixed<G, F>(tree: &ParaTree<u64, u64>, config: HarnessConfig, make_keys: F) -> Report
where
    G: Iterator<Item = u64> + Send,
    F: Fn(u64) -> G + Sync,
{
    config.mix.validate();
    assert!(config.threads >= 1, "need at least one worker");
    assert!(config.rounds >= 1, "need at least one round");

    // Warmup, untimed and unrecorded.
    if config.warmup_ops > 0 {
        run_round(tree, &config, &make_keys, u64::MAX, false);
    }

    let mut throughputs = Vec::with_capacity(config.rounds);
    let mut latencies: Vec<u64> = Vec::new();
    for round in 0..config.rounds {
        let (elapsed, mut round_latencies) =
            run_round(tree, &config, &make_keys, round as u64, true);
        let secs = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
        throughputs.push(config.ops_per_round as f64 / secs);
        latencies.append(&mut round_latencies);
    }

    let r = throughputs.len();
    let mean = throughputs.iter().sum::<f64>() / r as f64;
    let stddev = if r > 1 {
        let ss = throughputs
            .iter()
            .map(|t| {
                let d = t - mean;
                d * d
            })
            .sum::<f64>();
        (ss / (r - 1) as f64).sqrt()
    } else {
        0.0
    };
    let half_width = if r > 1 {
        t_975(r - 1) * stddev / (r as f64).sqrt()
    } else {
        0.0
    };

    latencies.sort_unstable();
    let latency = LatencyPercentiles {
        p50: percentile(&latencies, 0.50),
        p90: percentile(&latencies, 0.90),
        p99: percentile(&latencies, 0.99),
        p999: percentile(&latencies, 0.999),
    };

    Report {
        rounds: r,
        ops_per_round: config.ops_per_round,
        mean_ops_per_sec: mean,
        stddev_ops_per_sec: stddev,
        ci95_ops_per_sec: (mean - half_width, mean + half_width),
        latency,
    }
}

/// One round: workers split the operation count, each drawing keys from
/// its own generator. Returns the wall time and, when recording, the
/// per-operation latencies in nanoseconds.
fn run_round<G, F>(
    tree: &ParaTree<u64, u64>,
    config: &HarnessConfig,
    make_keys: &F,
    round: u64,
    record: bool,
) -> (Duration, Vec<u64>)
where
    G: Iterator<Item = u64> + Send,
    F: Fn(u64) -> G + Sync,
{
    let ops_total = if record {
        config.ops_per_round
    } else {
        config.warmup_ops
    };
    let per_worker = ops_total.div_ceil(config.threads);
    let mix = config.mix;
    let started = Instant::now();

    let samples: Vec<Vec<u64>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|worker| {
                let seed = config
                    .seed
                    .wrapping_mul(31)
                    .wrapping_add(round.wrapping_mul(1009))
                    .wrapping_add(worker as u64);
                let keys = make_keys(seed);
                scope.spawn(move || {
                    let mut ops = StdRng::seed_from_u64(seed ^ 0x9e37_79b9);
                    let mut recorded = Vec::with_capacity(if record { per_worker } else { 0 });
                    for key in keys.take(per_worker) {
                        let pick = ops.gen_range(0..100u32);
                        let op_start = record.then(Instant::now);
                        if pick < mix.get_pct {
                            let _ = tree.get(&key);
                        } else if pick < mix.get_pct + mix.insert_pct {
                            tree.insert(key, key);
                        } else {
                            let _ = tree.remove(&key);
                        }
                        if let Some(op_start) = op_start {
                            recorded.push(op_start.elapsed().as_nanos() as u64);
                        }
                    }
                    recorded
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let elapsed = started.elapsed();
    (elapsed, samples.into_iter().flatten().collect())
}

fn percentile(sorted: &[u64], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    let idx = rank.clamp(1, sorted.len()) - 1;
    Duration::from_nanos(sorted[idx])
}
