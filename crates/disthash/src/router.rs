//! Key-to-rank partitioning.
//!
//! Every key is owned by exactly one rank, `hash(key) mod rank_count`. The
//! router is a plain `Copy` value: each participant builds its own from the
//! shared rank count and no communication is needed to route a request.
//! Lookups are only correct as long as every rank uses the same router for
//! the whole lifetime of the table.

use crate::key::TableKey;
use crate::types::{RankId, TableError, TableResult};

/// Maps keys to their owning rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRouter {
    rank_count: u32,
}

impl PartitionRouter {
    /// Create a router over `rank_count` ranks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `rank_count` is 0.
    pub fn new(rank_count: u32) -> TableResult<Self> {
        if rank_count == 0 {
            return Err(TableError::InvalidConfig(
                "rank count must be greater than 0".to_string(),
            ));
        }
        Ok(Self { rank_count })
    }

    /// The rank that owns `key`.
    pub fn target_rank<K: TableKey>(&self, key: &K) -> RankId {
        self.rank_for_hash(key.table_hash())
    }

    /// The rank that owns any key hashing to `hash`.
    pub fn rank_for_hash(&self, hash: u64) -> RankId {
        RankId::new((hash % u64::from(self.rank_count)) as u32)
    }

    /// Number of ranks keys are spread over.
    pub fn rank_count(&self) -> u32 {
        self.rank_count
    }

    /// Whether `rank` is a valid target for this router.
    pub fn contains(&self, rank: RankId) -> bool {
        rank.as_u32() < self.rank_count
    }

    /// All ranks, in order.
    pub fn ranks(&self) -> impl Iterator<Item = RankId> {
        (0..self.rank_count).map(RankId::new)
    }
}
