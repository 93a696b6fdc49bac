//! disthash CLI - run, query and size distributed k-mer tables.

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "disthash")]
#[command(author, version, about = "disthash - a hash table sharded across ranks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark an in-process cluster with random k-mers
    Bench {
        /// Number of ranks
        #[arg(short, long, default_value = "4")]
        ranks: u32,

        /// Slots per rank (default: sized for --keys at 70% load)
        #[arg(short, long)]
        capacity: Option<usize>,

        /// Number of k-mers to insert
        #[arg(short = 'n', long, default_value = "100000")]
        keys: usize,

        /// K-mer length
        #[arg(short = 'k', long = "k", default_value = "19")]
        kmer_len: usize,

        /// Random seed
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Print a CSV row instead of the summary
        #[arg(long)]
        csv: bool,

        /// Repeat the run with 1, 2, 4 and 8 ranks at the same total capacity
        #[arg(long, conflicts_with = "csv")]
        scaling: bool,
    },

    /// Run one rank of a multi-process table
    Serve {
        /// Rank to run
        #[arg(short, long)]
        rank: u32,

        /// Config file (default: disthash.toml in this or a parent directory)
        #[arg(short, long)]
        config: Option<String>,

        /// Listen address (default: this rank's entry in `peers`)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Insert k-mer records into a running table
    Insert {
        /// Records of the form "ACGTA GF"
        #[arg(required = true)]
        records: Vec<String>,

        #[arg(short, long)]
        config: Option<String>,
    },

    /// Look up k-mers in a running table
    Find {
        /// K-mers to look up
        #[arg(required = true)]
        kmers: Vec<String>,

        #[arg(short, long)]
        config: Option<String>,
    },

    /// Show every rank's occupancy
    Status {
        #[arg(short, long)]
        config: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Compute the per-rank capacity for an expected number of keys
    Sizing {
        /// Expected number of distinct keys
        #[arg(short, long)]
        keys: u64,

        /// Number of ranks
        #[arg(short, long, default_value = "4")]
        ranks: u32,

        /// Maximum load factor
        #[arg(short, long, default_value = "0.7")]
        load: f64,

        /// Write the resulting config to this file
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Bench {
            ranks,
            capacity,
            keys,
            kmer_len,
            seed,
            csv,
            scaling,
        } => {
            let config = commands::bench::config(ranks, capacity, keys, kmer_len, seed);
            if scaling {
                commands::bench::scaling(config)
            } else {
                commands::bench::run(config, csv)
            }
        }
        Commands::Serve {
            rank,
            config,
            listen,
        } => commands::cluster::serve(rank, config.as_deref(), listen.as_deref()),
        Commands::Insert { records, config } => {
            commands::cluster::insert(&records, config.as_deref())
        }
        Commands::Find { kmers, config } => commands::cluster::find(&kmers, config.as_deref()),
        Commands::Status { config, json } => commands::cluster::status(config.as_deref(), json),
        Commands::Sizing {
            keys,
            ranks,
            load,
            output,
        } => commands::sizing::run(keys, ranks, load, output.as_deref()),
    }
}
