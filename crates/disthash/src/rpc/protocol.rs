//! tarpc service trait definitions.
//!
//! The wire surface of one rank: the same insert/find/stats operations the
//! local mailbox accepts, for k-mer entries.

use crate::kmer::{Kmer, KmerPair};
use crate::types::{RankId, ShardStats, TableError};
use serde::{Deserialize, Serialize};

/// Result type for RPC operations that needs to be serializable.
pub type RpcResult<T> = Result<T, RpcError>;

/// Serializable error type for RPC calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcError {
    /// The rank actor behind the server has stopped.
    RankUnavailable(u32),
    /// Internal error.
    Internal(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::RankUnavailable(rank) => write!(f, "Rank {} unavailable", rank),
            RpcError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<TableError> for RpcError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::RankUnavailable(rank) => RpcError::RankUnavailable(rank.as_u32()),
            other => RpcError::Internal(other.to_string()),
        }
    }
}

impl From<RpcError> for TableError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::RankUnavailable(rank) => TableError::RankUnavailable(RankId::new(rank)),
            RpcError::Internal(msg) => TableError::Rpc(msg),
        }
    }
}

/// Service provided by each rank of a distributed k-mer table.
///
/// Calls are executed by the rank's actor, so they are serialized with every
/// other request on that rank, local or remote.
#[tarpc::service]
pub trait ShardService {
    /// Insert an entry into this rank's shard.
    ///
    /// Returns `false` if the shard had no free slot along the key's probe
    /// sequence. The caller is responsible for routing: the shard does not
    /// check that it owns the key.
    async fn insert(entry: KmerPair) -> RpcResult<bool>;

    /// Look up a k-mer in this rank's shard.
    async fn find(kmer: Kmer) -> RpcResult<Option<KmerPair>>;

    /// Occupancy and operation counters of this rank's shard.
    async fn stats() -> RpcResult<ShardStats>;
}
