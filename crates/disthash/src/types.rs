//! Core types shared by every layer of the distributed table.
//!
//! This module defines rank identifiers, the table-wide error type and
//! the per-shard statistics snapshot reported through the invocation layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of one rank (one independent execution context) in the table.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
pub struct RankId(pub u32);

impl RankId {
    /// Create a new rank identifier.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the underlying rank number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// The rank number as a vector index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for RankId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank-{}", self.0)
    }
}

/// Errors that can cross the table's public contract.
///
/// A full shard and a missing key are *not* errors: they are reported as
/// `Ok(false)` from `insert` and `Ok(None)` from `find`. Only faults of the
/// invocation substrate and invalid construction parameters end up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("{0} is unavailable")]
    RankUnavailable(RankId),

    #[error("{rank} is out of range for a table of {rank_count} ranks")]
    RankOutOfRange { rank: RankId, rank_count: u32 },

    #[error("invalid table configuration: {0}")]
    InvalidConfig(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Point-in-time statistics of one shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardStats {
    /// Rank owning the shard.
    pub rank: RankId,
    /// Number of slots, fixed at construction.
    pub capacity: usize,
    /// Number of occupied slots.
    pub occupied: usize,
    /// Inserts that stored their entry.
    pub inserts: u64,
    /// Inserts rejected because every probed slot was taken.
    pub rejected: u64,
    /// Finds that returned an entry.
    pub hits: u64,
    /// Finds that returned nothing.
    pub misses: u64,
    /// Slots examined across all inserts and finds.
    pub probes: u64,
}

impl ShardStats {
    /// Ratio of occupied slots to capacity.
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.occupied as f64 / self.capacity as f64
    }

    /// Average number of slots examined per operation.
    pub fn mean_probes(&self) -> f64 {
        let ops = self.inserts + self.rejected + self.hits + self.misses;
        if ops == 0 {
            return 0.0;
        }
        self.probes as f64 / ops as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_id() {
        let rank = RankId::new(3);
        assert_eq!(rank.as_u32(), 3);
        assert_eq!(rank.index(), 3);
        assert_eq!(format!("{}", rank), "rank-3");
    }

    #[test]
    fn test_error_display() {
        let err = TableError::RankOutOfRange {
            rank: RankId::new(7),
            rank_count: 4,
        };
        assert_eq!(
            err.to_string(),
            "rank-7 is out of range for a table of 4 ranks"
        );
        assert_eq!(
            TableError::RankUnavailable(RankId::new(1)).to_string(),
            "rank-1 is unavailable"
        );
    }

    #[test]
    fn test_stats_ratios() {
        let stats = ShardStats {
            rank: RankId::new(0),
            capacity: 8,
            occupied: 6,
            inserts: 6,
            rejected: 0,
            hits: 2,
            misses: 2,
            probes: 20,
        };
        assert!((stats.load_factor() - 0.75).abs() < f64::EPSILON);
        assert!((stats.mean_probes() - 2.0).abs() < f64::EPSILON);

        let empty = ShardStats::default();
        assert_eq!(empty.load_factor(), 0.0);
        assert_eq!(empty.mean_probes(), 0.0);
    }
}
