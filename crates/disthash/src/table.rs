//! The distributed table as seen from one rank.
//!
//! A [`DistTable`] is the public surface: it routes each key with the
//! [`PartitionRouter`], hands the request to a [`Transport`] and returns a
//! [`Pending`] handle immediately. The logical table is never materialized;
//! it is the set of rank actors plus the shared router.
//!
//! [`LocalCluster`] builds a whole table inside one process, one actor per
//! rank, and gives out a `DistTable` for each rank.
//!
//! # Example
//!
//! ```rust,ignore
//! use disthash::{KmerPair, LocalCluster, RankId};
//!
//! let cluster = LocalCluster::<KmerPair>::create(4, 1024)?;
//! let table = cluster.table(RankId::new(0))?;
//!
//! let entry: KmerPair = "ACGTACGTACGTACGTACG FA".parse()?;
//! let stored = table.insert(entry);
//! let found = table.find(&entry.kmer);
//! assert!(stored.await?);
//! assert_eq!(found.await?, Some(entry));
//! ```

use crate::config::TableConfig;
use crate::key::TableEntry;
use crate::rank::{spawn_rank, Pending, RankHandle, ShardRequest};
use crate::router::PartitionRouter;
use crate::shard::Shard;
use crate::transport::{LocalTransport, Transport};
use crate::types::{RankId, ShardStats, TableError, TableResult};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// One rank's handle on the distributed table.
pub struct DistTable<E: TableEntry> {
    rank: RankId,
    router: PartitionRouter,
    local_capacity: usize,
    transport: Arc<dyn Transport<E>>,
}

impl<E: TableEntry> Clone for DistTable<E> {
    fn clone(&self) -> Self {
        Self {
            rank: self.rank,
            router: self.router,
            local_capacity: self.local_capacity,
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<E: TableEntry> DistTable<E> {
    /// Build a table handle for `rank`.
    ///
    /// # Errors
    ///
    /// Returns `RankOutOfRange` if `rank` is not covered by `router`, and
    /// `InvalidConfig` if the transport reaches a different number of ranks
    /// than the router routes to.
    pub fn new(
        rank: RankId,
        router: PartitionRouter,
        local_capacity: usize,
        transport: Arc<dyn Transport<E>>,
    ) -> TableResult<Self> {
        if !router.contains(rank) {
            return Err(TableError::RankOutOfRange {
                rank,
                rank_count: router.rank_count(),
            });
        }
        if transport.rank_count() != router.rank_count() {
            return Err(TableError::InvalidConfig(format!(
                "transport reaches {} ranks but router routes to {}",
                transport.rank_count(),
                router.rank_count()
            )));
        }
        Ok(Self {
            rank,
            router,
            local_capacity,
            transport,
        })
    }

    /// Insert `entry` on the rank that owns its key.
    ///
    /// Resolves to `Ok(true)` once stored and `Ok(false)` if the owning
    /// shard has no free slot along the key's probe sequence.
    pub fn insert(&self, entry: E) -> Pending<bool> {
        let target = self.router.target_rank(entry.key());
        debug!(from = %self.rank, to = %target, "Issuing insert");
        let (reply, pending) = Pending::channel(target);
        self.transport
            .submit(target, ShardRequest::Insert { entry, reply });
        pending
    }

    /// Look up `key` on the rank that owns it.
    ///
    /// Resolves to the first matching entry along the probe sequence, or
    /// `Ok(None)` if the key was never inserted.
    pub fn find(&self, key: &E::Key) -> Pending<Option<E>> {
        let target = self.router.target_rank(key);
        debug!(from = %self.rank, to = %target, "Issuing find");
        let (reply, pending) = Pending::channel(target);
        self.transport.submit(
            target,
            ShardRequest::Find {
                key: key.clone(),
                reply,
            },
        );
        pending
    }

    /// Statistics of `rank`'s shard.
    pub fn stats(&self, rank: RankId) -> Pending<ShardStats> {
        if !self.router.contains(rank) {
            return Pending::ready(
                rank,
                Err(TableError::RankOutOfRange {
                    rank,
                    rank_count: self.router.rank_count(),
                }),
            );
        }
        let (reply, pending) = Pending::channel(rank);
        self.transport.submit(rank, ShardRequest::Stats { reply });
        pending
    }

    /// Statistics of every shard, in rank order.
    pub async fn all_stats(&self) -> TableResult<Vec<ShardStats>> {
        let pending: Vec<_> = self.router.ranks().map(|rank| self.stats(rank)).collect();
        join_all(pending).await.into_iter().collect()
    }

    /// The rank owning `key`.
    pub fn target_rank(&self, key: &E::Key) -> RankId {
        self.router.target_rank(key)
    }

    /// The rank this handle belongs to.
    pub fn rank(&self) -> RankId {
        self.rank
    }

    pub fn router(&self) -> PartitionRouter {
        self.router
    }

    pub fn rank_count(&self) -> u32 {
        self.router.rank_count()
    }

    pub fn local_capacity(&self) -> usize {
        self.local_capacity
    }

    /// Slots across all ranks.
    pub fn logical_capacity(&self) -> u64 {
        self.local_capacity as u64 * u64::from(self.router.rank_count())
    }
}

/// A complete table running inside this process.
pub struct LocalCluster<E: TableEntry> {
    router: PartitionRouter,
    local_capacity: usize,
    transport: Arc<LocalTransport<E>>,
    ranks: Vec<RankHandle<E>>,
}

impl<E: TableEntry> LocalCluster<E> {
    /// Allocate `rank_count` shards of `local_capacity` slots and start an
    /// actor for each. Must be called inside a tokio runtime.
    pub fn create(rank_count: u32, local_capacity: usize) -> TableResult<Self> {
        let router = PartitionRouter::new(rank_count)?;
        let ranks = router
            .ranks()
            .map(|rank| Shard::new(rank, local_capacity).map(spawn_rank))
            .collect::<TableResult<Vec<_>>>()?;
        let transport = Arc::new(LocalTransport::new(
            ranks.iter().map(|r| r.mailbox().clone()).collect(),
        ));

        info!(
            rank_count,
            local_capacity,
            logical_capacity = local_capacity as u64 * u64::from(rank_count),
            "Local cluster created"
        );

        Ok(Self {
            router,
            local_capacity,
            transport,
            ranks,
        })
    }

    /// Create a cluster from a validated config.
    pub fn from_config(config: &TableConfig) -> TableResult<Self> {
        config.validate()?;
        Self::create(config.rank_count, config.local_capacity)
    }

    /// The table handle for `rank`.
    pub fn table(&self, rank: RankId) -> TableResult<DistTable<E>> {
        let transport: Arc<dyn Transport<E>> = self.transport.clone();
        DistTable::new(rank, self.router, self.local_capacity, transport)
    }

    /// One table handle per rank, in rank order.
    pub fn tables(&self) -> Vec<DistTable<E>> {
        self.router
            .ranks()
            .filter_map(|rank| self.table(rank).ok())
            .collect()
    }

    pub fn router(&self) -> PartitionRouter {
        self.router
    }

    pub fn rank_count(&self) -> u32 {
        self.router.rank_count()
    }

    /// Statistics of every shard, in rank order.
    pub async fn stats(&self) -> TableResult<Vec<ShardStats>> {
        let pending: Vec<_> = self.ranks.iter().map(|r| r.mailbox().stats()).collect();
        join_all(pending).await.into_iter().collect()
    }

    /// Stop every rank and return the shards, in rank order.
    ///
    /// Requests already queued complete first. Handles issued afterwards
    /// through surviving `DistTable` clones resolve to `RankUnavailable`.
    ///
    /// Every rank is stopped even if one of them fails; the first failure in
    /// rank order is returned.
    pub async fn shutdown(self) -> TableResult<Vec<Shard<E>>> {
        let results = join_all(self.ranks.into_iter().map(RankHandle::shutdown)).await;
        let shards = results.into_iter().collect::<TableResult<Vec<_>>>()?;
        info!(rank_count = shards.len(), "Local cluster shut down");
        Ok(shards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::TableKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Key whose hash panics from the third call on. The two routing
    /// lookups in the test succeed and the owning rank's actor dies while
    /// probing.
    #[derive(Debug, Clone)]
    struct Fuse(u64, Arc<AtomicUsize>);

    impl PartialEq for Fuse {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }

    impl Eq for Fuse {}

    impl TableKey for Fuse {
        fn table_hash(&self) -> u64 {
            if self.1.fetch_add(1, Ordering::SeqCst) > 1 {
                panic!("hash of {} failed", self.0);
            }
            self.0
        }
    }

    #[tokio::test]
    async fn test_create_rejects_bad_sizes() {
        assert!(LocalCluster::<(u64, u32)>::create(0, 8).is_err());
        assert!(LocalCluster::<(u64, u32)>::create(4, 0).is_err());
    }

    #[tokio::test]
    async fn test_table_for_each_rank() {
        let cluster = LocalCluster::<(u64, u32)>::create(3, 16).unwrap();
        let tables = cluster.tables();
        assert_eq!(tables.len(), 3);
        for (i, table) in tables.iter().enumerate() {
            assert_eq!(table.rank(), RankId::new(i as u32));
            assert_eq!(table.logical_capacity(), 48);
        }
        assert!(matches!(
            cluster.table(RankId::new(3)),
            Err(TableError::RankOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_insert_routes_to_owner() {
        let cluster = LocalCluster::<(u64, u32)>::create(4, 16).unwrap();
        let table = cluster.table(RankId::new(0)).unwrap();

        let key = 12345u64;
        let owner = table.target_rank(&key);
        assert_eq!(table.insert((key, 1)).await, Ok(true));

        let stats = cluster.stats().await.unwrap();
        for s in &stats {
            let expected = if s.rank == owner { 1 } else { 0 };
            assert_eq!(s.occupied, expected, "unexpected occupancy on {}", s.rank);
        }
    }

    #[tokio::test]
    async fn test_find_from_any_rank() {
        let cluster = LocalCluster::<(u64, u32)>::create(4, 32).unwrap();
        let tables = cluster.tables();

        let pending: Vec<_> = (0..40u64)
            .map(|k| tables[(k % 4) as usize].insert((k, k as u32 * 2)))
            .collect();
        for p in pending {
            assert_eq!(p.await, Ok(true));
        }

        for table in &tables {
            for k in 0..40u64 {
                assert_eq!(table.find(&k).await, Ok(Some((k, k as u32 * 2))));
            }
            assert_eq!(table.find(&1000).await, Ok(None));
        }
    }

    #[tokio::test]
    async fn test_stats_out_of_range() {
        let cluster = LocalCluster::<(u64, u32)>::create(2, 4).unwrap();
        let table = cluster.table(RankId::new(0)).unwrap();
        assert!(matches!(
            table.stats(RankId::new(9)).await,
            Err(TableError::RankOutOfRange { .. })
        ));
        assert_eq!(table.all_stats().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_returns_shards() {
        let cluster = LocalCluster::<(u64, u32)>::create(2, 8).unwrap();
        let table = cluster.table(RankId::new(1)).unwrap();
        assert_eq!(table.insert((7, 7)).await, Ok(true));

        let shards = cluster.shutdown().await.unwrap();
        assert_eq!(shards.iter().map(|s| s.len()).sum::<usize>(), 1);

        let owner = table.target_rank(&7);
        assert_eq!(
            table.find(&7).await,
            Err(TableError::RankUnavailable(owner))
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_every_rank_after_failure() {
        let cluster = LocalCluster::<(Fuse, u32)>::create(3, 4).unwrap();
        let table = cluster.table(RankId::new(2)).unwrap();

        let key = Fuse(0, Arc::new(AtomicUsize::new(0)));
        assert_eq!(table.target_rank(&key), RankId::new(0));
        assert_eq!(
            table.insert((key, 1)).await,
            Err(TableError::RankUnavailable(RankId::new(0)))
        );

        assert_eq!(
            cluster.shutdown().await.err(),
            Some(TableError::RankUnavailable(RankId::new(0)))
        );
        for rank in [RankId::new(1), RankId::new(2)] {
            assert_eq!(
                table.stats(rank).await,
                Err(TableError::RankUnavailable(rank))
            );
        }
    }
}
