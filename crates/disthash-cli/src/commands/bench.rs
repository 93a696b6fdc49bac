//! In-process benchmark.

use anyhow::Result;
use colored::Colorize;
use disthash::{local_capacity_for, BenchConfig, BenchResults};

/// Load factor used when no capacity is given.
const DEFAULT_LOAD: f64 = 0.7;

/// Benchmark parameters; capacity defaults to `keys` at 70% load.
pub fn config(
    ranks: u32,
    capacity: Option<usize>,
    keys: usize,
    kmer_len: usize,
    seed: u64,
) -> BenchConfig {
    let local_capacity =
        capacity.unwrap_or_else(|| local_capacity_for(keys as u64, ranks, DEFAULT_LOAD));
    BenchConfig {
        ranks,
        local_capacity,
        keys,
        kmer_len,
        seed,
    }
}

pub fn run(config: BenchConfig, csv: bool) -> Result<()> {
    if !csv {
        println!(
            "{} {} k-mers (k={}) into {} ranks x {} slots...",
            "bench".green().bold(),
            config.keys,
            config.kmer_len,
            config.ranks,
            config.local_capacity
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(disthash::run_benchmark(config))?;

    if csv {
        println!("{}", BenchResults::csv_header());
        println!("{}", results.to_csv_row());
        return Ok(());
    }

    results.print_summary();
    println!();
    if results.rejected > 0 {
        println!(
            "{} {} inserts rejected; raise --capacity or lower --keys",
            "warning".yellow().bold(),
            results.rejected
        );
    }
    if results.false_hits > 0 {
        anyhow::bail!("{} absent k-mers were reported as present", results.false_hits);
    }
    println!("{} all stored k-mers found again", "ok".green().bold());
    Ok(())
}

pub fn scaling(config: BenchConfig) -> Result<()> {
    println!(
        "{} scaling {} k-mers over {} total slots...",
        "bench".green().bold(),
        config.keys,
        config.local_capacity * config.ranks as usize
    );

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(disthash::scaling_benchmark(config))?;
    disthash::print_scaling_results(&results);
    Ok(())
}
