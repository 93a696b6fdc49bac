//! # disthash
//!
//! A fixed-capacity hash table partitioned across cooperating ranks.
//!
//! Each key is owned by exactly one rank, chosen by hashing the key. Inside
//! its rank the key lives in an open-addressing [`Shard`] with linear
//! probing. Any rank may insert or look up any key: the request is routed to
//! the owner and executed there by the rank's actor, and the caller gets a
//! [`Pending`] handle back immediately. Entries are never removed or
//! updated, and shards never grow.
//!
//! Ranks can live in one process ([`LocalCluster`]) or in separate
//! processes connected by tarpc ([`rpc`]).
//!
//! ```rust,ignore
//! use disthash::{KmerPair, LocalCluster, RankId};
//!
//! let cluster = LocalCluster::<KmerPair>::create(4, 1024)?;
//! let table = cluster.table(RankId::new(2))?;
//! let entry: KmerPair = "ACGTACGTACGTACGTACG FA".parse()?;
//! assert!(table.insert(entry).await?);
//! assert_eq!(table.find(&entry.kmer).await?, Some(entry));
//! ```

pub mod bench;
pub mod config;
pub mod key;
pub mod kmer;
pub mod rank;
pub mod router;
pub mod rpc;
pub mod shard;
pub mod table;
pub mod transport;
pub mod types;

pub use bench::{
    print_scaling_results, run_benchmark, scaling_benchmark, BenchConfig, BenchError, BenchResults,
};
pub use config::{local_capacity_for, RpcConfig, TableConfig};
pub use key::{TableEntry, TableKey};
pub use kmer::{Kmer, KmerError, KmerPair};
pub use rank::{spawn_rank, Pending, RankHandle, RankMailbox, ShardRequest};
pub use router::PartitionRouter;
pub use shard::Shard;
pub use table::{DistTable, LocalCluster};
pub use transport::{LocalTransport, Transport};
pub use types::*;
