//! Multi-process table commands.
//!
//! `serve` runs one rank; `insert`, `find` and `status` are one-shot clients
//! that route each k-mer with the table's router and call the owning rank
//! directly.

use crate::config;
use anyhow::{Context, Result};
use colored::Colorize;
use disthash::rpc::{call_context, ClientConfig, RankClientPool, ShardServer};
use disthash::{spawn_rank, Kmer, KmerPair, PartitionRouter, RankId, Shard, TableConfig};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Run rank `rank` until interrupted.
pub fn serve(rank: u32, config_path: Option<&str>, listen: Option<&str>) -> Result<()> {
    let config = config::load_with_peers(config_path)?;
    let rank = RankId::new(rank);
    if rank.as_u32() >= config.rank_count {
        anyhow::bail!(
            "Rank {} out of range: table has {} ranks",
            rank.as_u32(),
            config.rank_count
        );
    }
    let addr: SocketAddr = match listen {
        Some(addr) => addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", addr))?,
        None => config.peer_addr(rank)?,
    };

    println!(
        "{} Starting {} of {} with {} slots...",
        "serve".green().bold(),
        rank,
        config.rank_count,
        config.local_capacity
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let handle = spawn_rank(Shard::<KmerPair>::new(rank, config.local_capacity)?);
        let server = ShardServer::new(handle.mailbox().clone());
        let (bound, serve) = server
            .bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        println!("{} {} listening on {}", "ready".green().bold(), rank, bound);

        tokio::select! {
            _ = serve => warn!(%rank, "Server stopped accepting connections"),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!(%rank, "Interrupted, shutting down");
            }
        }

        let shard = handle.shutdown().await?;
        let stats = shard.stats();
        info!(
            %rank,
            occupied = stats.occupied,
            rejected = stats.rejected,
            "Rank served"
        );
        println!(
            "{} {} stopped with {}/{} slots occupied",
            "done".green().bold(),
            rank,
            stats.occupied,
            stats.capacity
        );
        Ok(())
    })
}

/// Insert records into the table described by the config.
pub fn insert(records: &[String], config_path: Option<&str>) -> Result<()> {
    let config = config::load_with_peers(config_path)?;
    let pairs = parse_records(records, config.kmer_len)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (router, pool) = connect(&config).await?;
        for pair in pairs {
            let rank = router.target_rank(&pair.kmer);
            let client = pool.get_client(rank).await?;
            let stored = client.insert(call_context(), pair).await??;
            if stored {
                println!("{} {} on {}", "stored".green().bold(), pair, rank);
            } else {
                println!("{} {} ({} is full)", "rejected".red().bold(), pair, rank);
            }
        }
        Ok(())
    })
}

/// Look up k-mers in the table described by the config.
pub fn find(kmers: &[String], config_path: Option<&str>) -> Result<()> {
    let config = config::load_with_peers(config_path)?;
    let kmers = parse_kmers(kmers, config.kmer_len)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (router, pool) = connect(&config).await?;
        for kmer in kmers {
            let rank = router.target_rank(&kmer);
            let client = pool.get_client(rank).await?;
            match client.find(call_context(), kmer).await?? {
                Some(pair) => println!(
                    "{} {} (backward {}, forward {}) on {}",
                    "found".green().bold(),
                    pair.kmer,
                    pair.backward_ext(),
                    pair.forward_ext(),
                    rank
                ),
                None => println!("{} {}", "missing".yellow().bold(), kmer),
            }
        }
        Ok(())
    })
}

/// Query every rank's statistics.
pub fn status(config_path: Option<&str>, json: bool) -> Result<()> {
    let config = config::load_with_peers(config_path)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (router, pool) = connect(&config).await?;
        let mut rows = Vec::with_capacity(config.rank_count as usize);
        for rank in router.ranks() {
            let stats = match pool.get_client(rank).await {
                Ok(client) => client
                    .stats(call_context())
                    .await
                    .map_err(anyhow::Error::from)
                    .and_then(|r| r.map_err(anyhow::Error::from)),
                Err(e) => Err(e.into()),
            };
            rows.push((rank, stats));
        }

        if json {
            let reachable: Vec<_> = rows.iter().filter_map(|(_, s)| s.as_ref().ok()).collect();
            println!("{}", serde_json::to_string_pretty(&reachable)?);
            return Ok(());
        }

        println!("{}", "Table Status".green().bold());
        println!("  Ranks: {}", config.rank_count);
        println!("  Slots per rank: {}", config.local_capacity);
        let mut occupied = 0;
        for (rank, stats) in &rows {
            let addr = config.peers.get(rank.index()).map(String::as_str).unwrap_or("?");
            match stats {
                Ok(stats) => {
                    occupied += stats.occupied;
                    println!(
                        "    {} -- {} ({}/{} slots, {:.1}%, {} rejected, {:.2} probes/op)",
                        rank.to_string().cyan(),
                        addr,
                        stats.occupied,
                        stats.capacity,
                        stats.load_factor() * 100.0,
                        stats.rejected,
                        stats.mean_probes()
                    );
                }
                Err(e) => println!(
                    "    {} -- {} {}",
                    rank.to_string().cyan(),
                    addr,
                    format!("unreachable: {}", e).red()
                ),
            }
        }
        println!(
            "  Occupied: {} of {} slots",
            occupied,
            config.logical_capacity()
        );
        Ok(())
    })
}

async fn connect(config: &TableConfig) -> Result<(PartitionRouter, RankClientPool)> {
    let router = PartitionRouter::new(config.rank_count)?;
    let pool = RankClientPool::with_config(ClientConfig::from(&config.rpc));
    for rank in router.ranks() {
        pool.register_rank(rank, config.peer_addr(rank)?).await;
    }
    Ok((router, pool))
}

fn parse_records(records: &[String], kmer_len: usize) -> Result<Vec<KmerPair>> {
    records
        .iter()
        .map(|r| {
            let pair: KmerPair = r
                .parse()
                .with_context(|| format!("Invalid record: {:?}", r))?;
            check_len(&pair.kmer, kmer_len)?;
            Ok(pair)
        })
        .collect()
}

fn parse_kmers(kmers: &[String], kmer_len: usize) -> Result<Vec<Kmer>> {
    kmers
        .iter()
        .map(|s| {
            let kmer: Kmer = s.parse().with_context(|| format!("Invalid k-mer: {:?}", s))?;
            check_len(&kmer, kmer_len)?;
            Ok(kmer)
        })
        .collect()
}

fn check_len(kmer: &Kmer, kmer_len: usize) -> Result<()> {
    if kmer.len() != kmer_len {
        anyhow::bail!(
            "{} has length {}, table is configured for k={}",
            kmer,
            kmer.len(),
            kmer_len
        );
    }
    Ok(())
}
