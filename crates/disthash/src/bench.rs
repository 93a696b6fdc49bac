//! Benchmarking utilities for the distributed table.
//!
//! Runs an in-process cluster, inserts random k-mers from every rank at
//! once, then looks all of them up again together with the same number of
//! k-mers that were never inserted.

use crate::kmer::{Kmer, KmerError, KmerPair, FRAGMENT_END};
use crate::table::{DistTable, LocalCluster};
use crate::types::{ShardStats, TableError, TableResult};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
const EXTENSIONS: [u8; 5] = [b'A', b'C', b'G', b'T', FRAGMENT_END];

/// Errors that abort a benchmark run.
#[derive(Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Kmer(#[from] KmerError),

    #[error("benchmark task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cannot draw {requested} distinct {len}-mers, only {available} exist")]
    KeySpace {
        requested: usize,
        len: usize,
        available: u128,
    },
}

/// Configuration for benchmark runs.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub ranks: u32,
    /// Slots per rank.
    pub local_capacity: usize,
    /// Number of distinct k-mers to insert.
    pub keys: usize,
    pub kmer_len: usize,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            ranks: 4,
            local_capacity: 1 << 16,
            keys: 100_000,
            kmer_len: 19,
            seed: 42,
        }
    }
}

impl BenchConfig {
    pub fn with_ranks(mut self, ranks: u32) -> Self {
        self.ranks = ranks;
        self
    }

    pub fn with_capacity(mut self, local_capacity: usize) -> Self {
        self.local_capacity = local_capacity;
        self
    }

    pub fn with_keys(mut self, keys: usize) -> Self {
        self.keys = keys;
        self
    }
}

/// Results from a benchmark run.
#[derive(Debug, Clone)]
pub struct BenchResults {
    pub setup_time: Duration,
    pub insert_time: Duration,
    pub find_time: Duration,
    pub inserts_per_second: f64,
    pub finds_per_second: f64,
    /// Inserts that returned `false` because the owning shard was full.
    pub rejected: usize,
    /// Inserted keys found again.
    pub hits: usize,
    /// Absent keys that were (wrongly) found. Always zero.
    pub false_hits: usize,
    pub rank_stats: Vec<ShardStats>,
    pub ranks: u32,
    pub keys: usize,
}

impl BenchResults {
    /// Print a formatted summary.
    pub fn print_summary(&self) {
        println!("\n=== Distributed Hash Table Benchmark ===\n");
        println!("Configuration:");
        println!("  Ranks: {}, Keys: {}", self.ranks, self.keys);
        println!();
        println!("Timing:");
        println!("  Setup time:   {:?}", self.setup_time);
        println!(
            "  Insert time:  {:?} ({:.0} inserts/sec)",
            self.insert_time, self.inserts_per_second
        );
        println!(
            "  Find time:    {:?} ({:.0} finds/sec)",
            self.find_time, self.finds_per_second
        );
        println!();
        println!(
            "Outcome: {} stored, {} rejected (shard full), {} found",
            self.keys - self.rejected,
            self.rejected,
            self.hits
        );
        for stats in &self.rank_stats {
            println!(
                "  {}: {}/{} slots ({:.1}%), {:.2} probes/op",
                stats.rank,
                stats.occupied,
                stats.capacity,
                stats.load_factor() * 100.0,
                stats.mean_probes()
            );
        }
    }

    /// Return results as a CSV row.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{:.2},{:.2},{},{}",
            self.ranks,
            self.keys,
            self.inserts_per_second,
            self.finds_per_second,
            self.rejected,
            (self.setup_time + self.insert_time + self.find_time).as_millis()
        )
    }

    pub fn csv_header() -> &'static str {
        "ranks,keys,inserts_per_sec,finds_per_sec,rejected,total_time_ms"
    }
}

/// A random k-mer of `len` bases.
pub fn random_kmer(rng: &mut impl Rng, len: usize) -> Result<Kmer, KmerError> {
    let bases: Vec<u8> = (0..len).map(|_| BASES[rng.random_range(0..4)]).collect();
    Kmer::from_bases(&bases)
}

/// Number of distinct k-mers of `len` bases, `None` if it exceeds `u128`.
fn kmer_space(len: usize) -> Option<u128> {
    4u128.checked_pow(u32::try_from(len).ok()?)
}

/// Fail unless `count` k-mers can be drawn from `available` candidates.
fn check_space(count: usize, len: usize, available: Option<u128>) -> Result<(), BenchError> {
    match available {
        Some(available) if count as u128 > available => Err(BenchError::KeySpace {
            requested: count,
            len,
            available,
        }),
        _ => Ok(()),
    }
}

/// `count` distinct random k-mer records, reproducible from `seed`.
///
/// # Errors
///
/// Returns `KeySpace` if fewer than `count` k-mers of length `len` exist.
pub fn random_kmers(count: usize, len: usize, seed: u64) -> Result<Vec<KmerPair>, BenchError> {
    Kmer::check_len(len)?;
    check_space(count, len, kmer_space(len))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    let mut pairs = Vec::with_capacity(count);
    while pairs.len() < count {
        let kmer = random_kmer(&mut rng, len)?;
        if !seen.insert(kmer) {
            continue;
        }
        let backward = EXTENSIONS[rng.random_range(0..EXTENSIONS.len())];
        let forward = EXTENSIONS[rng.random_range(0..EXTENSIONS.len())];
        pairs.push(KmerPair::new(kmer, backward, forward)?);
    }
    Ok(pairs)
}

/// `count` random k-mers that do not appear in `present`.
fn absent_kmers(
    present: &[KmerPair],
    count: usize,
    len: usize,
    seed: u64,
) -> Result<Vec<Kmer>, BenchError> {
    let present: HashSet<Kmer> = present.iter().map(|p| p.kmer).collect();
    let available = kmer_space(len).map(|space| space.saturating_sub(present.len() as u128));
    check_space(count, len, available)?;
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
    let mut absent = Vec::with_capacity(count);
    while absent.len() < count {
        let kmer = random_kmer(&mut rng, len)?;
        if !present.contains(&kmer) {
            absent.push(kmer);
        }
    }
    Ok(absent)
}

/// Entries issued by `rank_index`: every `ranks`-th entry.
fn slice_for(entries: &[KmerPair], rank_index: usize, ranks: usize) -> Vec<KmerPair> {
    entries.iter().skip(rank_index).step_by(ranks).copied().collect()
}

async fn insert_all(table: DistTable<KmerPair>, entries: Vec<KmerPair>) -> TableResult<usize> {
    let pending: Vec<_> = entries.into_iter().map(|e| table.insert(e)).collect();
    let mut rejected = 0;
    for stored in join_all(pending).await {
        if !stored? {
            rejected += 1;
        }
    }
    Ok(rejected)
}

async fn find_all(table: DistTable<KmerPair>, keys: Vec<Kmer>) -> TableResult<usize> {
    let pending: Vec<_> = keys.iter().map(|k| table.find(k)).collect();
    let mut hits = 0;
    for found in join_all(pending).await {
        if found?.is_some() {
            hits += 1;
        }
    }
    Ok(hits)
}

/// Run the benchmark.
///
/// Every rank issues its share of the inserts concurrently without waiting
/// on individual results, then the same for finds.
///
/// # Errors
///
/// Returns an error for invalid sizes or if a rank stops mid-run.
pub async fn run_benchmark(config: BenchConfig) -> Result<BenchResults, BenchError> {
    let setup_start = Instant::now();
    let cluster = LocalCluster::<KmerPair>::create(config.ranks, config.local_capacity)?;
    let tables = cluster.tables();
    let entries = random_kmers(config.keys, config.kmer_len, config.seed)?;
    let absent = absent_kmers(&entries, config.keys, config.kmer_len, config.seed)?;
    let setup_time = setup_start.elapsed();
    let ranks = tables.len();

    let insert_start = Instant::now();
    let inserts = tables
        .iter()
        .enumerate()
        .map(|(i, table)| tokio::spawn(insert_all(table.clone(), slice_for(&entries, i, ranks))));
    let mut rejected = 0;
    for result in join_all(inserts).await {
        rejected += result??;
    }
    let insert_time = insert_start.elapsed();

    let find_start = Instant::now();
    let finds = tables.iter().enumerate().map(|(i, table)| {
        let present: Vec<Kmer> = slice_for(&entries, i, ranks).iter().map(|p| p.kmer).collect();
        let missing: Vec<Kmer> = absent.iter().skip(i).step_by(ranks).copied().collect();
        let table = table.clone();
        tokio::spawn(async move {
            let hits = find_all(table.clone(), present).await?;
            let false_hits = find_all(table, missing).await?;
            TableResult::Ok((hits, false_hits))
        })
    });
    let mut hits = 0;
    let mut false_hits = 0;
    for result in join_all(finds).await {
        let (h, f) = result??;
        hits += h;
        false_hits += f;
    }
    let find_time = find_start.elapsed();

    let rank_stats = cluster.stats().await?;
    cluster.shutdown().await?;

    info!(keys = config.keys, rejected, hits, "Benchmark complete");

    Ok(BenchResults {
        setup_time,
        insert_time,
        find_time,
        inserts_per_second: config.keys as f64 / insert_time.as_secs_f64(),
        finds_per_second: (2 * config.keys) as f64 / find_time.as_secs_f64(),
        rejected,
        hits,
        false_hits,
        rank_stats,
        ranks: config.ranks,
        keys: config.keys,
    })
}

/// Run the same workload with 1, 2, 4 and 8 ranks.
///
/// Total capacity is held constant so every run sees the same load factor.
pub async fn scaling_benchmark(base: BenchConfig) -> Result<Vec<BenchResults>, BenchError> {
    let total_capacity = base.local_capacity * base.ranks as usize;
    let mut results = Vec::new();
    for ranks in [1u32, 2, 4, 8] {
        info!(ranks, "Running scaling step");
        let config = BenchConfig {
            ranks,
            local_capacity: total_capacity.div_ceil(ranks as usize),
            ..base.clone()
        };
        results.push(run_benchmark(config).await?);
    }
    Ok(results)
}

/// Print scaling benchmark results as a table.
pub fn print_scaling_results(results: &[BenchResults]) {
    println!("\n=== Scaling Results ===\n");
    println!(
        "| {:>5} | {:>12} | {:>12} | {:>8} | {:>11} |",
        "Ranks", "Inserts/sec", "Finds/sec", "Rejected", "Max load"
    );
    println!("|-------|--------------|--------------|----------|-------------|");
    for r in results {
        let max_load = r
            .rank_stats
            .iter()
            .map(ShardStats::load_factor)
            .fold(0.0, f64::max);
        println!(
            "| {:>5} | {:>12.0} | {:>12.0} | {:>8} | {:>10.1}% |",
            r.ranks,
            r.inserts_per_second,
            r.finds_per_second,
            r.rejected,
            max_load * 100.0
        );
    }
}
